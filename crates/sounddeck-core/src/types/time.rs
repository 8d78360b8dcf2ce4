//! Stream-time values and frame rates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A time value expressed in units of some [`TimeScale`].
pub type TimeValue = i64;

/// Number of time units per second.
pub type TimeScale = i64;

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// A frame rate as a `duration / scale` rational: one frame lasts
/// `duration` units of a clock ticking `scale` times per second.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct FrameRate {
    duration: TimeValue,
    scale: TimeScale,
}

impl FrameRate {
    pub const fn new(duration: TimeValue, scale: TimeScale) -> Self {
        Self { duration, scale }
    }

    /// Frame duration in time-scale units.
    pub const fn duration(&self) -> TimeValue {
        self.duration
    }

    /// Units per second.
    pub const fn scale(&self) -> TimeScale {
        self.scale
    }

    /// Wall-clock length of one frame, or zero for a degenerate rate.
    pub fn interval(&self) -> Duration {
        if self.duration <= 0 || self.scale <= 0 {
            return Duration::ZERO;
        }
        let nanos = i128::from(self.duration) * NANOS_PER_SEC / i128::from(self.scale);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Frames per second as a float, for display.
    #[allow(clippy::cast_precision_loss)]
    pub fn frames_per_second(&self) -> f64 {
        if self.duration == 0 {
            return 0.0;
        }
        self.scale as f64 / self.duration as f64
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.duration, self.scale)
    }
}

/// A stream-time instant: a value tagged with the scale it is expressed in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct StreamTime {
    pub value: TimeValue,
    pub scale: TimeScale,
}

impl StreamTime {
    pub const fn new(value: TimeValue, scale: TimeScale) -> Self {
        Self { value, scale }
    }

    /// Converts to seconds.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_secs_f64(&self) -> f64 {
        if self.scale == 0 {
            return 0.0;
        }
        self.value as f64 / self.scale as f64
    }
}
