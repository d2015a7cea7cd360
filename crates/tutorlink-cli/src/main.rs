//! tutorlink CLI entry point

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use tutorlink_cli::{
    cli::{Cli, Commands, ConfigAction},
    commands::CommandDispatcher,
    config::AppConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // `config init` must work even when the target file is missing or broken
    let config = match &cli.command {
        Commands::Config {
            action: ConfigAction::Init { .. },
        } => AppConfig::default(),
        _ => AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?,
    };

    setup_logging(cli.verbose, &config.log.level);
    debug!("Effective configuration: {:?}", config);

    if let Err(e) = CommandDispatcher::execute(cli, config).await {
        error!("Command execution failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Setup logging; `RUST_LOG` wins over `--verbose` and the configured level
fn setup_logging(verbose: bool, level: &str) {
    let level = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
