//! Software playback output.
//!
//! [`SoundOutput`] ties the playback clock, frame queue, scheduler thread
//! and audio writer together behind the [`PlaybackOutput`] contract.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use parking_lot::{Mutex, RwLock};
use sounddeck_core::{
    AudioOutputSettings, DisplayMode, DisplayModeInfo, Error, FrameRate, OutputConfig, Result,
    StreamTime, TimeScale, TimeValue,
};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::audio::{AudioOutputWriter, CpalBackend, NegotiatedFormat, PcmBackend};
use crate::clock::PlaybackClock;
use crate::contract::{PlaybackOutput, ScheduledStreamTime};
use crate::frame::{FrameCompletionSink, FrameHandle, PreviewSink, SinkRegistry};
use crate::queue::FrameQueue;
use crate::scheduler::{Scheduler, SchedulerContext};

/// Video side of the output state machine. Audio is tracked separately by
/// the writer's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputState {
    #[default]
    Idle,
    VideoEnabled,
    PlaybackRunning,
    PlaybackStopped,
}

/// A playback output backed by a sound device and a software frame clock.
pub struct SoundOutput {
    config: OutputConfig,
    queue: Arc<FrameQueue>,
    sinks: Arc<SinkRegistry>,
    clock: Arc<PlaybackClock>,
    video: RwLock<Option<&'static DisplayModeInfo>>,
    scheduler: Mutex<Option<Scheduler>>,
    state: RwLock<OutputState>,
    audio: AudioOutputWriter,
}

impl SoundOutput {
    /// Output on the configured cpal device.
    pub fn new(config: OutputConfig) -> Self {
        let backend = Arc::new(CpalBackend::new(&config));
        Self::with_backend(config, backend)
    }

    pub fn with_backend(config: OutputConfig, backend: Arc<dyn PcmBackend>) -> Self {
        let audio = AudioOutputWriter::new(backend, config.device.clone());
        Self {
            config,
            queue: Arc::new(FrameQueue::new()),
            sinks: Arc::new(SinkRegistry::new()),
            clock: Arc::new(PlaybackClock::new()),
            video: RwLock::new(None),
            scheduler: Mutex::new(None),
            state: RwLock::new(OutputState::Idle),
            audio,
        }
    }

    pub const fn config(&self) -> &OutputConfig {
        &self.config
    }

    pub fn state(&self) -> OutputState {
        *self.state.read()
    }

    /// The enabled display mode, if any.
    pub fn display_mode(&self) -> Option<&'static DisplayModeInfo> {
        *self.video.read()
    }

    pub fn audio_format(&self) -> Option<NegotiatedFormat> {
        self.audio.format()
    }

    /// Stops the scheduler thread and releases every queued frame, returning
    /// how many were released. The output stays usable.
    pub fn shutdown(&self) -> Result<usize> {
        let released = self.halt_scheduler()?;
        let mut state = self.state.write();
        if *state == OutputState::PlaybackRunning {
            *state = OutputState::PlaybackStopped;
        }
        Ok(released)
    }

    fn scheduler_running(&self) -> bool {
        self.scheduler.lock().as_ref().is_some_and(|s| !s.is_finished())
    }

    fn halt_scheduler(&self) -> Result<usize> {
        let scheduler = self.scheduler.lock().take();
        let released = match scheduler {
            Some(scheduler) => scheduler.shutdown()?,
            None => 0,
        };
        // Anything queued after the thread exited.
        Ok(released + self.queue.clear())
    }

    fn scheduler_context(&self) -> SchedulerContext {
        SchedulerContext {
            queue: Arc::clone(&self.queue),
            sinks: Arc::clone(&self.sinks),
            clock: Arc::clone(&self.clock),
            lookahead: self.config.retire_lookahead,
        }
    }

    fn reprime_audio(&self) {
        if !self.audio.is_enabled() {
            return;
        }
        if let Err(e) = self.audio.reprime() {
            warn!("Failed to re-prime audio device: {e}");
        }
    }
}

fn check_scale(scale: TimeScale) -> Result<()> {
    if scale > 0 {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!("time scale must be positive, got {scale}")))
    }
}

impl PlaybackOutput for SoundOutput {
    fn enable_video_output(&self, mode: DisplayMode) -> Result<FrameRate> {
        let info = mode.info().ok_or(Error::UnsupportedDisplayMode(mode))?;

        self.clock.start(info.frame_rate);
        *self.video.write() = Some(info);
        {
            let mut state = self.state.write();
            if *state == OutputState::Idle {
                *state = OutputState::VideoEnabled;
            }
        }

        info!(
            "Video output enabled: {} ({}x{}, {})",
            info.name(),
            info.width,
            info.height,
            info.frame_rate
        );
        Ok(info.frame_rate)
    }

    fn disable_video_output(&self) -> Result<()> {
        let released = self.halt_scheduler()?;
        self.clock.reset();
        *self.video.write() = None;
        *self.state.write() = OutputState::Idle;
        info!("Video output disabled, released {released} frames");
        Ok(())
    }

    fn frame_rate(&self) -> Result<FrameRate> {
        self.video
            .read()
            .map(|info| info.frame_rate)
            .ok_or(Error::VideoOutputNotEnabled)
    }

    fn set_scheduled_frame_completion_callback(
        &self,
        sink: Option<Arc<dyn FrameCompletionSink>>,
    ) -> Result<()> {
        self.sinks.set_completion(sink);
        Ok(())
    }

    fn set_screen_preview_callback(&self, sink: Option<Arc<dyn PreviewSink>>) -> Result<()> {
        self.sinks.set_preview(sink);
        Ok(())
    }

    fn schedule_video_frame(
        &self,
        frame: &FrameHandle,
        display_time: TimeValue,
        duration: TimeValue,
        scale: TimeScale,
    ) -> Result<()> {
        check_scale(scale)?;
        let due = display_time
            .checked_add(duration)
            .ok_or_else(|| Error::InvalidArgument("display time overflows".to_string()))?;

        if !self.sinks.any() {
            trace!("No sink registered, frame not retained");
            return Ok(());
        }
        self.queue.push_back(frame, StreamTime::new(due, scale));
        Ok(())
    }

    fn display_video_frame_sync(&self, frame: &FrameHandle) -> Result<()> {
        self.queue.replace_head(frame);
        Ok(())
    }

    fn buffered_video_frame_count(&self) -> Result<u32> {
        Ok(u32::try_from(self.queue.len()).unwrap_or(u32::MAX))
    }

    fn enable_audio_output(&self, settings: &AudioOutputSettings) -> Result<NegotiatedFormat> {
        debug!("Audio stream type {:?}", settings.stream_type);
        self.audio.enable(settings)
    }

    fn disable_audio_output(&self) -> Result<()> {
        self.audio.disable()
    }

    fn write_audio_samples_sync(&self, buffer: &[u8], sample_frame_count: u32) -> Result<u32> {
        Ok(self.audio.write(buffer, sample_frame_count))
    }

    fn schedule_audio_samples(
        &self,
        buffer: &[u8],
        sample_frame_count: u32,
        stream_time: TimeValue,
        scale: TimeScale,
    ) -> Result<u32> {
        trace!("Audio scheduled at {stream_time}/{scale}");
        Ok(self.audio.write(buffer, sample_frame_count))
    }

    fn start_scheduled_playback(
        &self,
        start_time: TimeValue,
        scale: TimeScale,
        speed: f64,
    ) -> Result<()> {
        if !self.clock.is_started() {
            return Err(Error::VideoOutputNotEnabled);
        }
        debug!("Scheduled playback requested at {start_time}/{scale}, speed {speed}");

        let restarting = self.state() == OutputState::PlaybackStopped;
        {
            let mut scheduler = self.scheduler.lock();
            if scheduler.as_ref().is_some_and(|s| !s.is_finished()) {
                drop(scheduler);
                self.reprime_audio();
            } else {
                if let Some(finished) = scheduler.take() {
                    if let Err(e) = finished.shutdown() {
                        warn!("Previous scheduler exited abnormally: {e}");
                    }
                }
                *scheduler = Some(Scheduler::spawn(self.scheduler_context())?);
                drop(scheduler);
                if restarting {
                    self.reprime_audio();
                }
            }
        }

        *self.state.write() = OutputState::PlaybackRunning;
        Ok(())
    }

    fn stop_scheduled_playback(&self, stop_at: TimeValue, scale: TimeScale) -> Result<TimeValue> {
        debug!("Scheduled playback stop requested at {stop_at}/{scale}");
        if let Err(e) = self.audio.drain_and_drop() {
            warn!("Failed to drain audio device: {e}");
        }

        if self.config.stop_halts_scheduler {
            let released = self.halt_scheduler()?;
            debug!("Scheduler halted on stop, released {released} frames");
        }

        {
            let mut state = self.state.write();
            if *state == OutputState::PlaybackRunning {
                *state = OutputState::PlaybackStopped;
            }
        }

        let stopped_at = if scale > 0 {
            self.clock.stream_time(scale).unwrap_or(0)
        } else {
            0
        };
        info!("Scheduled playback stopped");
        Ok(stopped_at)
    }

    fn is_scheduled_playback_running(&self) -> Result<bool> {
        Ok(self.state() == OutputState::PlaybackRunning && self.scheduler_running())
    }

    fn scheduled_stream_time(&self, scale: TimeScale) -> Result<ScheduledStreamTime> {
        check_scale(scale)?;
        self.clock
            .stream_time(scale)
            .map(|value| ScheduledStreamTime {
                value,
                playback_speed: 1.0,
            })
            .ok_or(Error::VideoOutputNotEnabled)
    }
}

impl Drop for SoundOutput {
    fn drop(&mut self) {
        match self.halt_scheduler() {
            Ok(released) if released > 0 => debug!("Released {released} frames on teardown"),
            Ok(_) => {}
            Err(e) => warn!("Scheduler teardown failed: {e}"),
        }
        self.audio.close();
    }
}
