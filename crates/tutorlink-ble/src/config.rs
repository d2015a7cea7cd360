//! BLE transport configuration

use std::time::Duration;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for the btleplug transport
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BleTransportConfig {
    /// Which local adapter to use when several are present
    pub adapter_index: usize,
    /// Maximum time to wait for a connection to be established
    pub connection_timeout_ms: u64,
    /// Maximum time to wait for service discovery
    pub discovery_timeout_ms: u64,
}

impl Default for BleTransportConfig {
    fn default() -> Self {
        Self {
            adapter_index: 0,
            connection_timeout_ms: 10_000,
            discovery_timeout_ms: 10_000,
        }
    }
}

impl BleTransportConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    /// Set adapter index
    pub fn with_adapter_index(mut self, index: usize) -> Self {
        self.adapter_index = index;
        self
    }

    /// Set connection timeout
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set service discovery timeout
    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout_ms = timeout.as_millis() as u64;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let config = BleTransportConfig::new()
            .with_adapter_index(1)
            .with_connection_timeout(Duration::from_secs(3));
        assert_eq!(config.adapter_index, 1);
        assert_eq!(config.connection_timeout(), Duration::from_secs(3));
        assert_eq!(config.discovery_timeout(), Duration::from_secs(10));
    }
}
