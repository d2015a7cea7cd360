//! Session configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::protocol::{ServiceContract, WriteMode, DEFAULT_MAX_CHUNK_LEN, DEFAULT_SCAN_DURATION_MS};

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// How accepted inbound notifications are turned into delivered messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboundPolicy {
    /// Every accepted non-empty notification is delivered as-is
    #[default]
    PerNotification,
    /// Notifications accumulate until one ends with the `$` terminator
    SentinelTerminated,
}

/// Configuration for a BLE session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Length of one discovery window
    pub scan_duration_ms: u64,
    /// Maximum bytes per characteristic write
    pub max_chunk_len: usize,
    /// Write mode enabled on the characteristic when the session becomes ready
    pub write_mode: WriteMode,
    /// Inbound reassembly policy
    pub inbound: InboundPolicy,
    /// Message sent automatically once the session is ready
    pub ready_greeting: Option<String>,
    /// Service/characteristic/descriptor identifiers of the peripheral
    pub service: ServiceContract,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scan_duration_ms: DEFAULT_SCAN_DURATION_MS,
            max_chunk_len: DEFAULT_MAX_CHUNK_LEN,
            write_mode: WriteMode::default(),
            inbound: InboundPolicy::default(),
            ready_greeting: None,
            service: ServiceContract::default(),
        }
    }
}

impl SessionConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Discovery window as a `Duration`
    pub fn scan_duration(&self) -> Duration {
        Duration::from_millis(self.scan_duration_ms)
    }

    /// Set the discovery window
    pub fn with_scan_duration(mut self, duration: Duration) -> Self {
        self.scan_duration_ms = duration.as_millis() as u64;
        self
    }

    /// Set the maximum chunk length
    pub fn with_max_chunk_len(mut self, len: usize) -> Self {
        self.max_chunk_len = len;
        self
    }

    /// Set the characteristic write mode
    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    /// Set the inbound reassembly policy
    pub fn with_inbound_policy(mut self, policy: InboundPolicy) -> Self {
        self.inbound = policy;
        self
    }

    /// Send `greeting` as soon as the session is ready
    pub fn with_ready_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.ready_greeting = Some(greeting.into());
        self
    }

    /// Target a different service contract
    pub fn with_service(mut self, service: ServiceContract) -> Self {
        self.service = service;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_chunk_len == 0 {
            return Err(ConfigError::ZeroChunkLen);
        }
        if self.scan_duration_ms == 0 {
            return Err(ConfigError::ZeroScanDuration);
        }
        if matches!(self.ready_greeting.as_deref(), Some("")) {
            return Err(ConfigError::EmptyGreeting);
        }
        Ok(())
    }
}
