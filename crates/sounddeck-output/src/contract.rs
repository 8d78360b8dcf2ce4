//! The host-facing playback output contract.
//!
//! [`SoundOutput`](crate::SoundOutput) implements it over a sound device; an
//! injected vendor driver implements it too, so hosts drive both the same way.

use sounddeck_core::{
    AudioOutputSettings, DisplayMode, DisplayModeInfo, Error, FrameRate, Result, TimeScale,
    TimeValue, DISPLAY_MODES,
};
use std::sync::Arc;

use crate::audio::NegotiatedFormat;
use crate::frame::{FrameCompletionSink, FrameHandle, PreviewSink};

/// Stream time reported to the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledStreamTime {
    pub value: TimeValue,
    pub playback_speed: f64,
}

/// A hardware reference clock reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareReferenceTime {
    pub hardware_time: TimeValue,
    pub time_in_frame: TimeValue,
    pub ticks_per_frame: TimeValue,
}

/// Scheduled video and audio playback.
pub trait PlaybackOutput: Send + Sync {
    /// Display modes this output can present.
    fn display_modes(&self) -> &'static [DisplayModeInfo] {
        &DISPLAY_MODES
    }

    fn does_support_video_mode(&self, mode: DisplayMode) -> bool {
        mode.is_supported()
    }

    /// Anchors the playback clock for `mode` and returns its frame rate.
    fn enable_video_output(&self, mode: DisplayMode) -> Result<FrameRate>;

    fn disable_video_output(&self) -> Result<()>;

    /// Frame rate of the enabled display mode.
    fn frame_rate(&self) -> Result<FrameRate>;

    fn set_scheduled_frame_completion_callback(
        &self,
        sink: Option<Arc<dyn FrameCompletionSink>>,
    ) -> Result<()>;

    fn set_screen_preview_callback(&self, sink: Option<Arc<dyn PreviewSink>>) -> Result<()>;

    /// Queues `frame` to be retired once `display_time + duration` has
    /// passed on the playback clock.
    fn schedule_video_frame(
        &self,
        frame: &FrameHandle,
        display_time: TimeValue,
        duration: TimeValue,
        scale: TimeScale,
    ) -> Result<()>;

    /// Replaces the pending head frame with `frame`.
    fn display_video_frame_sync(&self, frame: &FrameHandle) -> Result<()>;

    fn buffered_video_frame_count(&self) -> Result<u32>;

    fn create_video_frame(
        &self,
        _width: u32,
        _height: u32,
        _row_bytes: usize,
    ) -> Result<FrameHandle> {
        Err(Error::NotSupported("video frame allocation"))
    }

    fn enable_audio_output(&self, settings: &AudioOutputSettings) -> Result<NegotiatedFormat>;

    fn disable_audio_output(&self) -> Result<()>;

    /// Writes interleaved frames, returning how many the device accepted.
    fn write_audio_samples_sync(&self, buffer: &[u8], sample_frame_count: u32) -> Result<u32>;

    /// Same as a synchronous write; the stream time is informational.
    fn schedule_audio_samples(
        &self,
        buffer: &[u8],
        sample_frame_count: u32,
        stream_time: TimeValue,
        scale: TimeScale,
    ) -> Result<u32>;

    fn begin_audio_preroll(&self) -> Result<()> {
        Ok(())
    }

    fn end_audio_preroll(&self) -> Result<()> {
        Ok(())
    }

    fn buffered_audio_sample_frame_count(&self) -> Result<u32> {
        Err(Error::NotSupported("buffered audio sample count"))
    }

    fn flush_buffered_audio_samples(&self) -> Result<()> {
        Err(Error::NotSupported("audio flush"))
    }

    fn start_scheduled_playback(
        &self,
        start_time: TimeValue,
        scale: TimeScale,
        speed: f64,
    ) -> Result<()>;

    /// Stops playback and returns the stream time at which it stopped.
    fn stop_scheduled_playback(&self, stop_at: TimeValue, scale: TimeScale) -> Result<TimeValue>;

    fn is_scheduled_playback_running(&self) -> Result<bool>;

    fn scheduled_stream_time(&self, scale: TimeScale) -> Result<ScheduledStreamTime>;

    fn reference_status(&self) -> Result<u32> {
        Err(Error::NotSupported("reference status"))
    }

    fn hardware_reference_clock(&self, _scale: TimeScale) -> Result<HardwareReferenceTime> {
        Err(Error::NotSupported("hardware reference clock"))
    }

    fn frame_completion_reference_timestamp(
        &self,
        _frame: &FrameHandle,
        _scale: TimeScale,
    ) -> Result<TimeValue> {
        Err(Error::NotSupported("frame completion timestamp"))
    }
}
