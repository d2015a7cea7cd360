//! Error types for the BLE transport

use thiserror::Error;
use tutorlink_core::SessionError;
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors specific to the BLE transport and session driver
#[derive(Error, Debug)]
pub enum BleTransportError {
    #[error("BLE adapter not available")]
    AdapterNotAvailable,

    #[error("BLE adapter {index} not found ({available} available)")]
    AdapterIndexOutOfRange { index: usize, available: usize },

    #[error("Peer not found: {address}")]
    PeerNotFound { address: String },

    #[error("Peer not connected")]
    PeerNotConnected,

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Service discovery timeout")]
    DiscoveryTimeout,

    #[error("Characteristic not found: {characteristic}")]
    CharacteristicNotFound { characteristic: Uuid },

    #[error("Failed to get BLE events: {0}")]
    EventStreamFailed(String),

    #[error("Failed to get notifications stream: {0}")]
    NotificationStreamFailed(String),

    #[error("BLE error: {0}")]
    Btleplug(#[from] btleplug::Error),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Session driver has shut down")]
    DriverClosed,
}

impl BleTransportError {
    /// The adapter itself is missing, refused or unusable
    pub fn is_adapter_unavailable(&self) -> bool {
        matches!(
            self,
            BleTransportError::AdapterNotAvailable
                | BleTransportError::AdapterIndexOutOfRange { .. }
                | BleTransportError::Btleplug(btleplug::Error::PermissionDenied)
                | BleTransportError::Btleplug(btleplug::Error::NotSupported(_))
        )
    }
}

/// Result type for transport and driver operations
pub type Result<T> = std::result::Result<T, BleTransportError>;
