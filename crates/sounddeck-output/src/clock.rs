//! Playback clock.
//!
//! Stream time is the time elapsed since video output was enabled, expressed
//! in whatever time scale the caller asks for. The anchor is captured once
//! per enable and is only moved by enabling again.

use parking_lot::RwLock;
use sounddeck_core::{FrameRate, TimeScale, TimeValue};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct ClockState {
    anchor: Instant,
    frame_rate: FrameRate,
}

/// Virtual playback clock shared by the host and the scheduler thread.
#[derive(Debug, Default)]
pub struct PlaybackClock {
    state: RwLock<Option<ClockState>>,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Anchors the clock at the current instant.
    pub fn start(&self, frame_rate: FrameRate) {
        *self.state.write() = Some(ClockState {
            anchor: Instant::now(),
            frame_rate,
        });
        debug!("Playback clock anchored at frame rate {frame_rate}");
    }

    /// Forgets the anchor; stream time is unavailable until the next start.
    pub fn reset(&self) {
        *self.state.write() = None;
    }

    pub fn is_started(&self) -> bool {
        self.state.read().is_some()
    }

    pub fn frame_rate(&self) -> Option<FrameRate> {
        self.state.read().map(|s| s.frame_rate)
    }

    /// Length of one frame at the anchored frame rate.
    pub fn frame_interval(&self) -> Option<Duration> {
        self.frame_rate().map(|rate| rate.interval())
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.state.read().map(|s| s.anchor.elapsed())
    }

    /// Elapsed stream time in `scale` units, rounded to the nearest unit.
    pub fn stream_time(&self, scale: TimeScale) -> Option<TimeValue> {
        self.elapsed().map(|elapsed| to_stream_units(elapsed, scale))
    }
}

/// Converts an elapsed duration to `scale` units, rounding half to even.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn to_stream_units(elapsed: Duration, scale: TimeScale) -> TimeValue {
    let seconds = elapsed.as_secs() as f64 + f64::from(elapsed.subsec_nanos()) / 1e9;
    (seconds * scale as f64).round_ties_even() as TimeValue
}
