//! Output configuration.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "SOUNDDECK_CONFIG";

/// Sound device identifier meaning "the system default output".
pub const DEFAULT_DEVICE: &str = "default";

/// Tunables of a playback output object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Sound device to open for audio output.
    pub device: String,
    /// Frames that must be queued before the head frame can be retired.
    pub retire_lookahead: usize,
    /// Whether stopping scheduled playback also stops the scheduler thread.
    pub stop_halts_scheduler: bool,
    /// Capacity of the software sample ring in milliseconds of audio.
    pub ring_buffer_ms: u32,
    /// Longest time a drain waits for queued audio to play out.
    pub drain_timeout_ms: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            retire_lookahead: 2,
            stop_halts_scheduler: false,
            ring_buffer_ms: 500,
            drain_timeout_ms: 2000,
        }
    }
}

impl OutputConfig {
    /// Same defaults, bound to a specific sound device.
    pub fn for_device(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Self::default()
        }
    }

    /// Loads the config from `$SOUNDDECK_CONFIG`, then the platform config
    /// directory, falling back to defaults when neither file exists.
    pub fn load() -> Result<Self> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::from_path(Path::new(&path));
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::from_path(&path),
            _ => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Platform location of `config.json`.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "sounddeck", "SoundDeck")
            .map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Reads and validates a JSON config file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).inspect_err(|e| {
            warn!("Failed to read config {}: {e}", path.display());
        })?;
        let config = Self::from_json(&text)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parses and validates a JSON document.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retire_lookahead == 0 {
            return Err(Error::Config("retire_lookahead must be at least 1".into()));
        }
        if self.ring_buffer_ms == 0 {
            return Err(Error::Config("ring_buffer_ms must be positive".into()));
        }
        if self.device.trim().is_empty() {
            return Err(Error::Config("device must not be empty".into()));
        }
        Ok(())
    }

    pub const fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}
