//! tutorlink CLI configuration management
//!
//! Configuration is a single TOML file with `[session]`, `[ble]` and `[log]`
//! tables. It is read from `--config` when given, otherwise from
//! `~/.tutorlink/config.toml` if that file exists, otherwise defaults apply.
//! Missing keys fall back to their defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use tutorlink_ble::BleTransportConfig;
use tutorlink_core::SessionConfig;

use crate::error::{CliError, Result};

const CONFIG_DIR: &str = ".tutorlink";
const CONFIG_FILE: &str = "config.toml";
const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the CLI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Session protocol settings
    pub session: SessionConfig,
    /// BLE adapter and timeouts
    pub ble: BleTransportConfig,
    /// Logging
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default level when `RUST_LOG` is unset and `--verbose` is not given
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ----------------------------------------------------------------------------
// Loading and Saving
// ----------------------------------------------------------------------------

impl AppConfig {
    /// `~/.tutorlink/config.toml`
    pub fn default_config_path() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
            .ok_or_else(|| CliError::Config("Could not determine home directory".to_string()))
    }

    /// Resolve and load the effective configuration
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }

        let path = Self::default_config_path()?;
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            debug!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save configuration, creating parent directories as needed
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<()> {
        self.session
            .validate()
            .map_err(|e| CliError::Config(e.to_string()))?;

        if !LOG_LEVELS.contains(&self.log.level.to_ascii_lowercase().as_str()) {
            return Err(CliError::Config(format!(
                "Unknown log level: {}",
                self.log.level
            )));
        }
        if self.ble.connection_timeout_ms == 0 || self.ble.discovery_timeout_ms == 0 {
            return Err(CliError::Config(
                "BLE timeouts must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
