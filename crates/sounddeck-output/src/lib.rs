//! # sounddeck-output
//!
//! Software emulation of a scheduled video/audio playback device.
//!
//! Features:
//! - Playback clock derived from elapsed time since video output was enabled
//! - Frame queue retired by a background scheduler thread at the frame rate
//! - Audio writer with channel-count negotiation and underrun recovery
//! - `cpal` sound backend fed through a lock-free sample ring

pub mod audio;
pub mod clock;
pub mod contract;
pub mod device;
pub mod frame;
pub mod output;
pub mod queue;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use audio::{AudioOutputWriter, CpalBackend, NegotiatedFormat, PcmBackend, PcmDevice};
pub use clock::PlaybackClock;
pub use contract::{HardwareReferenceTime, PlaybackOutput, ScheduledStreamTime};
pub use device::{discover, DeviceHandle, DeviceSource, ExternalDevice, SoundDevice};
pub use frame::{FrameCompletionSink, FrameHandle, PreviewSink, VideoFrame};
pub use output::{OutputState, SoundOutput};
pub use queue::FrameQueue;
