//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "tutorlink", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Scan for nearby peripherals
    Scan {
        /// Print the peer list as JSON
        #[arg(long)]
        json: bool,
    },
    /// Connect and chat interactively; each input line is sent as a message
    Chat {
        /// Peer address; scans and offers a picker when omitted
        #[arg(short, long)]
        address: Option<String>,
    },
    /// Connect, send a single message and exit
    Send {
        /// Peer address
        #[arg(short, long)]
        address: String,
        /// Message text
        message: String,
    },
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum ConfigAction {
    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}
