//! Core domain types for SoundDeck.

pub mod attributes;
pub mod audio;
pub mod mode;
pub mod time;

pub use attributes::{DeviceAttributes, API_VERSION, API_VERSION_STRING};
pub use audio::{AudioOutputSettings, AudioStreamType, SampleType};
pub use mode::{Colorspace, DisplayMode, DisplayModeInfo, FieldDominance, DISPLAY_MODES};
pub use time::{FrameRate, StreamTime, TimeScale, TimeValue};
