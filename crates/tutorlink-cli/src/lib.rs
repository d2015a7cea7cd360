//! tutorlink CLI library
//!
//! Wires the BLE transport and session driver into a small command-line
//! client: scanning, an interactive chat with a tutor peripheral, one-shot
//! sends and configuration file management.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use app::TutorApp;
pub use cli::{Cli, Commands};
pub use commands::CommandDispatcher;
pub use config::AppConfig;
pub use error::{CliError, Result};
