//! Error handling for the tutorlink CLI

use thiserror::Error;
use tutorlink_ble::BleTransportError;
use tutorlink_core::StatusNotice;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Session error: {0}")]
    Session(#[from] tutorlink_core::SessionError),

    #[error("BLE transport error: {0}")]
    Transport(#[from] tutorlink_ble::BleTransportError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Scan failed: {0}")]
    ScanFailed(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("{0}")]
    Unavailable(StatusNotice),

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),
}

impl CliError {
    /// Classify a failure to open the BLE stack
    pub fn startup(error: BleTransportError) -> Self {
        if error.is_adapter_unavailable() {
            CliError::Unavailable(StatusNotice::TransportUnavailable {
                reason: error.to_string(),
            })
        } else {
            CliError::Transport(error)
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_adapter_is_transport_unavailable() {
        let err = CliError::startup(BleTransportError::AdapterNotAvailable);
        assert!(matches!(
            err,
            CliError::Unavailable(StatusNotice::TransportUnavailable { .. })
        ));
    }

    #[test]
    fn test_other_startup_errors_stay_transport_errors() {
        let err = CliError::startup(BleTransportError::EventStreamFailed("closed".into()));
        assert!(matches!(err, CliError::Transport(_)));
    }
}
