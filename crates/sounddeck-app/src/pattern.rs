//! Test signals: a UYVY grey-bar frame and an interleaved sine tone.

use sounddeck_core::SampleType;
use sounddeck_output::VideoFrame;
use std::f64::consts::TAU;

const BARS: u32 = 8;

/// An 8-bit 4:2:2 frame of vertical grey bars.
pub struct BarsFrame {
    width: u32,
    height: u32,
    bytes: Vec<u8>,
}

impl BarsFrame {
    pub fn new(width: u32, height: u32) -> Self {
        let row_bytes = width as usize * 2;
        let mut row = Vec::with_capacity(row_bytes);
        for x in 0..width {
            let bar = x * BARS / width.max(1);
            let luma = 16 + bar * 219 / (BARS - 1);
            // U/Y0 or V/Y1, neutral chroma.
            row.extend_from_slice(&[128, luma as u8]);
        }
        let bytes = row.repeat(height as usize);
        Self {
            width,
            height,
            bytes,
        }
    }
}

impl VideoFrame for BarsFrame {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn row_bytes(&self) -> usize {
        self.width as usize * 2
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Sine generator writing the same sample to every channel.
pub struct SineTone {
    phase: f64,
    step: f64,
    amplitude: f64,
}

impl SineTone {
    pub fn new(frequency: f64, sample_rate: u32) -> Self {
        Self {
            phase: 0.0,
            step: TAU * frequency / f64::from(sample_rate.max(1)),
            amplitude: 0.25,
        }
    }

    /// Replaces `out` with `frames` interleaved frames of little-endian samples.
    #[allow(clippy::cast_possible_truncation)]
    pub fn fill(
        &mut self,
        out: &mut Vec<u8>,
        frames: usize,
        channels: usize,
        sample_type: SampleType,
    ) {
        out.clear();
        out.reserve(frames * channels * sample_type.width_bytes());
        for _ in 0..frames {
            let value = self.phase.sin() * self.amplitude;
            self.phase = (self.phase + self.step) % TAU;
            let sample = match sample_type {
                SampleType::Int16 => ((value * f64::from(i16::MAX)) as i16).to_le_bytes().to_vec(),
                SampleType::Int32 => ((value * f64::from(i32::MAX)) as i32).to_le_bytes().to_vec(),
            };
            for _ in 0..channels {
                out.extend_from_slice(&sample);
            }
        }
    }
}
