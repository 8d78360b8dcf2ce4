//! # SoundDeck
//!
//! Command-line driver for the SoundDeck software playback device.

mod cli;
mod commands;
mod pattern;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use sounddeck_core::OutputConfig;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sounddeck=info,sounddeck_output=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => OutputConfig::from_path(path)?,
        None => OutputConfig::load()?,
    };

    match cli.command {
        Command::Devices { json } => commands::devices(&config, json)?,
        Command::Modes => commands::modes(),
        Command::Play(args) => {
            info!("Starting SoundDeck v{}", env!("CARGO_PKG_VERSION"));
            let report = commands::play(config, &args)?;
            println!("{report}");
        }
    }

    Ok(())
}
