//! # sounddeck-core
//!
//! Core types, the display-mode catalog, configuration, and error handling
//! for the SoundDeck software playback device.

pub mod config;
pub mod error;
pub mod types;

pub use config::OutputConfig;
pub use error::{Error, Result};
pub use types::*;
