//! Audio output to a physical sound device.
//!
//! The writer only talks to the device through [`PcmBackend`] and
//! [`PcmDevice`], which mirror a classic blocking PCM playback API: open,
//! negotiate hardware parameters, commit, write interleaved frames, detect
//! underrun, re-prime, drain, drop. Closing the device is dropping it.

pub mod cpal_backend;
pub mod ring;
pub mod writer;

use sounddeck_core::{Result, SampleType};

pub use cpal_backend::CpalBackend;
pub use writer::{repack_channels, AudioOutputWriter, NegotiatedFormat};

/// Buffer layout requested from the device. Only interleaved access is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmAccess {
    RwInterleaved,
}

/// Sample encoding handed to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmFormat {
    S16Le,
    S32Le,
}

impl PcmFormat {
    pub const fn width_bytes(&self) -> usize {
        match self {
            Self::S16Le => 2,
            Self::S32Le => 4,
        }
    }
}

impl From<SampleType> for PcmFormat {
    fn from(sample_type: SampleType) -> Self {
        match sample_type {
            SampleType::Int16 => Self::S16Le,
            SampleType::Int32 => Self::S32Le,
        }
    }
}

/// Run state of an open device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmState {
    /// Parameters set but the device is stopped; needs `prepare`.
    Setup,
    /// Ready to accept the first write.
    Prepared,
    Running,
    /// The playback buffer ran dry; writes fail until `prepare`.
    Xrun,
}

/// A playback device the backend can open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmDeviceInfo {
    pub id: String,
    pub name: String,
}

/// A source of playback devices.
pub trait PcmBackend: Send + Sync {
    fn playback_devices(&self) -> Result<Vec<PcmDeviceInfo>>;

    fn open_playback(&self, device: &str) -> Result<Box<dyn PcmDevice>>;
}

/// An open playback device.
pub trait PcmDevice: Send {
    fn set_access(&mut self, access: PcmAccess) -> Result<()>;

    /// Selects the supported rate nearest to `rate` and returns it.
    fn set_rate_near(&mut self, rate: u32) -> Result<u32>;

    fn set_format(&mut self, format: PcmFormat) -> Result<()>;

    /// Fails if the device does not accept exactly `channels` channels.
    fn set_channels(&mut self, channels: u32) -> Result<()>;

    /// Applies the negotiated parameters and leaves the device prepared.
    fn commit(&mut self) -> Result<()>;

    fn state(&self) -> PcmState;

    /// Re-primes the device after an underrun or a drop.
    fn prepare(&mut self) -> Result<()>;

    /// Writes `frames` interleaved frames from `data`; may block.
    fn write_interleaved(&mut self, data: &[u8], frames: usize) -> Result<usize>;

    /// Blocks until queued audio has played, then stops the device.
    fn drain(&mut self) -> Result<()>;

    /// Stops the device, discarding queued audio.
    fn drop_pending(&mut self) -> Result<()>;
}
