//! Error types for SoundDeck.

use thiserror::Error;

use crate::types::DisplayMode;

/// Result type alias using SoundDeck's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for SoundDeck.
#[derive(Error, Debug)]
pub enum Error {
    // Unsupported configuration
    #[error("Unsupported display mode: {0}")]
    UnsupportedDisplayMode(DisplayMode),

    #[error("Unsupported audio sample type: {0}")]
    UnsupportedSampleType(u32),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Device negotiation
    #[error("Failed to open sound device: {0}")]
    DeviceOpen(String),

    #[error("Sound device rejected parameters: {0}")]
    DeviceNegotiation(String),

    #[error("Sound device failed to commit parameters: {0}")]
    DeviceCommit(String),

    // Transient device faults
    #[error("Sound device underrun")]
    Underrun,

    #[error("Audio output error: {0}")]
    AudioOutput(String),

    // Unsupported operations
    #[error("Not available in software emulation: {0}")]
    NotSupported(&'static str),

    // State errors
    #[error("Video output is not enabled")]
    VideoOutputNotEnabled,

    #[error("Audio output is not enabled")]
    AudioOutputNotEnabled,

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if the request named a mode or format the device cannot take.
    pub const fn is_unsupported_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedDisplayMode(_)
                | Self::UnsupportedSampleType(_)
                | Self::InvalidArgument(_)
        )
    }

    /// Returns true if the sound device could not be opened or configured.
    pub const fn is_device_failure(&self) -> bool {
        matches!(
            self,
            Self::DeviceOpen(_) | Self::DeviceNegotiation(_) | Self::DeviceCommit(_)
        )
    }

    /// Returns true if the fault is recoverable by re-priming the device.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Underrun | Self::AudioOutput(_))
    }

    /// Returns true if the operation is never available in emulation.
    pub const fn is_not_supported(&self) -> bool {
        matches!(self, Self::NotSupported(_))
    }
}
