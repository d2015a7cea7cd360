//! Command handlers for the tutorlink CLI

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{debug, info};
use tutorlink_core::{Notice, PeerDevice, StatusNotice};

use crate::app::TutorApp;
use crate::cli::{Cli, Commands, ConfigAction};
use crate::config::AppConfig;
use crate::error::{CliError, Result};

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

type InputLines = Lines<BufReader<Stdin>>;

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        match cli.command {
            Commands::Scan { json } => Self::handle_scan_command(&config, json).await,
            Commands::Chat { address } => Self::handle_chat_command(&config, address).await,
            Commands::Send { address, message } => {
                Self::handle_send_command(&config, &address, &message).await
            }
            Commands::Config { action } => Self::handle_config_command(&config, cli.config, action),
        }
    }

    /// Handle the scan command
    async fn handle_scan_command(config: &AppConfig, json: bool) -> Result<()> {
        let mut app = TutorApp::start(config).await?;
        let result = app.scan().await;
        app.stop().await?;
        let peers = result?;

        if json {
            println!("{}", serde_json::to_string_pretty(&peers)?);
        } else if peers.is_empty() {
            println!("{}", StatusNotice::NoPeersFound);
        } else {
            print!("{}", format_peer_list(&peers));
        }
        Ok(())
    }

    /// Handle the chat command
    async fn handle_chat_command(config: &AppConfig, address: Option<String>) -> Result<()> {
        let mut app = TutorApp::start(config).await?;
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        let address = match address {
            Some(address) => address,
            None => match pick_peer(&mut app, &mut lines).await? {
                Some(address) => address,
                None => return app.stop().await,
            },
        };

        println!("Connecting to {}...", address);
        if let Err(e) = app.connect(&address).await {
            app.stop().await?;
            return Err(e);
        }
        println!("Connected. Type a message and press Enter, Ctrl+D to quit.");

        loop {
            tokio::select! {
                line = lines.next_line() => match line? {
                    Some(line) => {
                        let text = line.trim_end();
                        if text.is_empty() {
                            continue;
                        }
                        // Rejections come back as status notices
                        if let Err(e) = app.session().send(text).await {
                            debug!("Send rejected: {}", e);
                        }
                    }
                    None => break,
                },
                notice = app.next_notice() => match notice {
                    Some(notice) => {
                        print_notice(&notice);
                        if matches!(notice, Notice::Status(StatusNotice::Disconnected { .. })) {
                            break;
                        }
                    }
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        info!("Leaving chat");
        app.stop().await
    }

    /// Handle the send command
    async fn handle_send_command(config: &AppConfig, address: &str, message: &str) -> Result<()> {
        let mut app = TutorApp::start(config).await?;

        let result = async {
            app.connect(address).await?;
            app.session().send(message).await?;
            app.wait_for_transfer(DELIVERY_TIMEOUT).await
        }
        .await;

        app.stop().await?;
        result?;
        println!("Message sent to {}", address);
        Ok(())
    }

    /// Handle the config command
    fn handle_config_command(
        config: &AppConfig,
        path: Option<PathBuf>,
        action: ConfigAction,
    ) -> Result<()> {
        match action {
            ConfigAction::Init { force } => {
                let path = match path {
                    Some(path) => path,
                    None => AppConfig::default_config_path()?,
                };
                if path.exists() && !force {
                    return Err(CliError::Config(format!(
                        "{} already exists, use --force to overwrite",
                        path.display()
                    )));
                }
                AppConfig::default().save_to_file(&path)?;
                println!("Wrote default configuration to {}", path.display());
            }
            ConfigAction::Show => print!("{}", config.to_toml()?),
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Peer Picker
// ----------------------------------------------------------------------------

async fn pick_peer(app: &mut TutorApp, lines: &mut InputLines) -> Result<Option<String>> {
    println!("Scanning...");
    let peers = app.scan().await?;
    if peers.is_empty() {
        println!("{}", StatusNotice::NoPeersFound);
        return Ok(None);
    }
    print!("{}", format_peer_list(&peers));

    loop {
        print!("Select a device [1-{}]: ", peers.len());
        std::io::stdout().flush()?;

        let Some(input) = lines.next_line().await? else {
            return Ok(None);
        };
        match parse_selection(&input, peers.len()) {
            Some(index) => return Ok(Some(peers[index].address.clone())),
            None => println!("Invalid selection"),
        }
    }
}

/// Numbered `name / address` lines, one per peer
pub fn format_peer_list(peers: &[PeerDevice]) -> String {
    peers
        .iter()
        .enumerate()
        .map(|(i, peer)| format!("  [{}] {}\n", i + 1, peer))
        .collect()
}

/// Parse a 1-based menu choice into an index
pub fn parse_selection(input: &str, count: usize) -> Option<usize> {
    match input.trim().parse::<usize>() {
        Ok(choice) if (1..=count).contains(&choice) => Some(choice - 1),
        _ => None,
    }
}

fn print_notice(notice: &Notice) {
    match notice {
        Notice::MessageReceived(text) => println!("tutor> {}", text),
        Notice::PeerListReady(peers) => print!("{}", format_peer_list(peers)),
        Notice::Status(status) => println!("* {}", status),
    }
}
