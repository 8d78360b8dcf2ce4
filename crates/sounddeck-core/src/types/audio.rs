//! Audio sample and stream types.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Integer sample formats the host may request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    /// Signed 16-bit little-endian.
    Int16,
    /// Signed 32-bit little-endian.
    Int32,
}

impl SampleType {
    /// Bytes per sample.
    pub const fn width_bytes(&self) -> usize {
        match self {
            Self::Int16 => 2,
            Self::Int32 => 4,
        }
    }

    /// Bit depth, which is also the host's sample-type code.
    pub const fn bits(&self) -> u32 {
        match self {
            Self::Int16 => 16,
            Self::Int32 => 32,
        }
    }
}

impl TryFrom<u32> for SampleType {
    type Error = Error;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            16 => Ok(Self::Int16),
            32 => Ok(Self::Int32),
            other => Err(Error::UnsupportedSampleType(other)),
        }
    }
}

/// How the host intends to feed samples. Recorded for logging only; both
/// continuous and timestamped writes go straight to the device.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AudioStreamType {
    #[default]
    Continuous,
    ContinuousDontResample,
    Timestamped,
}

/// Parameters of an audio-output-enable request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudioOutputSettings {
    pub sample_rate: u32,
    pub sample_type: SampleType,
    pub channel_count: u32,
    #[serde(default)]
    pub stream_type: AudioStreamType,
}

impl AudioOutputSettings {
    pub const fn new(sample_rate: u32, sample_type: SampleType, channel_count: u32) -> Self {
        Self {
            sample_rate,
            sample_type,
            channel_count,
            stream_type: AudioStreamType::Continuous,
        }
    }

    #[must_use]
    pub const fn with_stream_type(mut self, stream_type: AudioStreamType) -> Self {
        self.stream_type = stream_type;
        self
    }

    /// Bytes per interleaved frame as the host lays it out.
    pub const fn frame_stride(&self) -> usize {
        self.channel_count as usize * self.sample_type.width_bytes()
    }
}

impl Default for AudioOutputSettings {
    fn default() -> Self {
        Self::new(48000, SampleType::Int16, 2)
    }
}
