use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "sounddeck")]
#[command(about = "Software playback device on top of a sound card", version)]
pub struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List playback devices.
    Devices {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List supported display modes.
    Modes,
    /// Play a test pattern and tone for a while.
    Play(PlayArgs),
}

#[derive(Debug, Args, Clone)]
pub struct PlayArgs {
    /// Sound device id; overrides the config file.
    #[arg(long)]
    pub device: Option<String>,

    /// Display mode name, e.g. 1080p25 or NTSC.
    #[arg(long, default_value = "1080p25")]
    pub mode: String,

    #[arg(long, default_value_t = 5)]
    pub seconds: u64,

    /// Channels requested from the device.
    #[arg(long, default_value_t = 2)]
    pub channels: u32,

    /// Tone frequency in Hz.
    #[arg(long, default_value_t = 440.0)]
    pub frequency: f64,

    /// Sample width, 16 or 32.
    #[arg(long, default_value_t = 16)]
    pub bits: u32,
}
