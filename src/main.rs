//! ArmDeck macro pad driver CLI
//!
//! A command-line interface for configuring ArmDeck BLE macro pads.

use anyhow::Result;
use clap::Parser;
use tracing::debug;

use armdeck_driver::DriverConfig;

// CLI definitions
mod cli;
use cli::{Cli, Commands};

// Command handlers
mod commands;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --log-level
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(DriverConfig::default_path);
    let mut config = DriverConfig::load(&config_path)?;
    debug!("Config: {}", config_path.display());
    if let Some(address) = cli.address.clone() {
        config.device.address = Some(address);
    }
    if let Some(secs) = cli.scan_seconds {
        config.device.scan_seconds = secs;
    }

    match cli.command {
        // Default: show device info
        None | Some(Commands::Info) => commands::query::info(&config, cli.json).await,
        Some(Commands::Scan) => commands::query::scan(&config, cli.json).await,
        Some(Commands::Buttons { stored }) => {
            commands::query::buttons(&config, stored, cli.json).await
        }

        Some(Commands::Set {
            slot,
            label,
            action,
            color,
        }) => commands::buttons::set(&config, slot, label, action, color).await,
        Some(Commands::Reset) => commands::buttons::reset(&config).await,
        Some(Commands::Test { slot }) => commands::buttons::test(&config, slot).await,
        Some(Commands::Restart) => commands::buttons::restart(&config).await,
        Some(Commands::Keymap { apply, push }) => {
            commands::buttons::keymap(&config, apply.as_deref(), push).await
        }

        Some(Commands::Config { write }) => {
            commands::utility::config(&config, &config_path, write)
        }
    }
}
