//! Error types for the session protocol

use thiserror::Error;

use crate::event::StatusNotice;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Precondition violations reported back to the caller of a session operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Not connected")]
    NotConnected,

    #[error("Already connected to {address}")]
    AlreadyConnected { address: String },

    #[error("Connection already in progress ({state})")]
    ConnectionInProgress { state: &'static str },

    #[error("A message is still being transmitted")]
    MessageInFlight,

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Rejected configuration values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_chunk_len must be at least 1")]
    ZeroChunkLen,

    #[error("scan_duration_ms must be at least 1")]
    ZeroScanDuration,

    #[error("ready greeting must not be empty")]
    EmptyGreeting,
}

impl SessionError {
    /// Status notice surfaced to the presentation layer for a rejected request
    pub fn status_notice(&self) -> Option<StatusNotice> {
        match self {
            SessionError::NotConnected => Some(StatusNotice::NotConnected),
            SessionError::MessageInFlight => Some(StatusNotice::Busy),
            _ => None,
        }
    }
}

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
