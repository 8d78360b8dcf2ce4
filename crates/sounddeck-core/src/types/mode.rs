//! Display-mode catalog.
//!
//! The emulated device advertises a fixed set of SD and HD modes. A mode is
//! identified by the vendor's four-character code, so hosts can pass codes
//! this table has never heard of; lookups for those fail.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use serde::{Deserialize, Serialize};
use std::fmt;

use super::time::FrameRate;

/// Four-character display-mode code.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct DisplayMode(u32);

const fn fourcc(code: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*code)
}

impl DisplayMode {
    pub const NTSC: Self = Self(fourcc(b"ntsc"));
    pub const PAL: Self = Self(fourcc(b"pal "));

    pub const HD1080P2398: Self = Self(fourcc(b"23ps"));
    pub const HD1080P24: Self = Self(fourcc(b"24ps"));
    pub const HD1080P25: Self = Self(fourcc(b"Hp25"));
    pub const HD1080P2997: Self = Self(fourcc(b"Hp29"));
    pub const HD1080P30: Self = Self(fourcc(b"Hp30"));
    pub const HD1080I50: Self = Self(fourcc(b"Hi50"));
    pub const HD1080I5994: Self = Self(fourcc(b"Hi59"));
    pub const HD1080I6000: Self = Self(fourcc(b"Hi60"));
    pub const HD1080P50: Self = Self(fourcc(b"Hp50"));
    pub const HD1080P5994: Self = Self(fourcc(b"Hp59"));
    pub const HD1080P6000: Self = Self(fourcc(b"Hp60"));

    pub const HD720P50: Self = Self(fourcc(b"hp50"));
    pub const HD720P5994: Self = Self(fourcc(b"hp59"));
    pub const HD720P60: Self = Self(fourcc(b"hp60"));

    /// Wraps a raw code without checking it against the catalog.
    pub const fn from_code(code: u32) -> Self {
        Self(code)
    }

    pub const fn code(&self) -> u32 {
        self.0
    }

    /// Catalog entry for this mode, if the device supports it.
    pub fn info(&self) -> Option<&'static DisplayModeInfo> {
        DISPLAY_MODES.iter().find(|m| m.mode == *self)
    }

    pub fn is_supported(&self) -> bool {
        self.info().is_some()
    }

    const fn field_dominance(&self) -> FieldDominance {
        match *self {
            Self::NTSC | Self::PAL => FieldDominance::LowerFieldFirst,
            Self::HD1080I50 | Self::HD1080I5994 | Self::HD1080I6000 => {
                FieldDominance::UpperFieldFirst
            }
            _ => FieldDominance::Progressive,
        }
    }

    const fn colorspace(&self) -> Colorspace {
        match *self {
            Self::NTSC | Self::PAL => Colorspace::Rec601,
            _ => Colorspace::Rec709,
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0.to_be_bytes();
        if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            let text: String = bytes.iter().map(|b| char::from(*b)).collect();
            write!(f, "'{text}'")
        } else {
            write!(f, "{:#010x}", self.0)
        }
    }
}

/// Field order of the video signal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FieldDominance {
    LowerFieldFirst,
    UpperFieldFirst,
    Progressive,
}

impl FieldDominance {
    pub const fn is_progressive(&self) -> bool {
        matches!(self, Self::Progressive)
    }
}

/// Colorspace flag advertised with each mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Colorspace {
    Rec601,
    Rec709,
}

/// One entry of the display-mode catalog.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct DisplayModeInfo {
    pub mode: DisplayMode,
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    pub field_dominance: FieldDominance,
    pub colorspace: Colorspace,
}

impl DisplayModeInfo {
    /// `scale` and `duration` follow the catalog's column order: a 29.97 Hz
    /// mode is written `30000, 1001`.
    const fn entry(mode: DisplayMode, width: u32, height: u32, scale: i64, duration: i64) -> Self {
        Self {
            mode,
            width,
            height,
            frame_rate: FrameRate::new(duration, scale),
            field_dominance: mode.field_dominance(),
            colorspace: mode.colorspace(),
        }
    }

    /// Human-readable name such as `NTSC`, `1080p23.98` or `720p60`.
    pub fn name(&self) -> String {
        match self.mode {
            DisplayMode::NTSC => "NTSC".to_string(),
            DisplayMode::PAL => "PAL".to_string(),
            _ => {
                let scan = if self.field_dominance.is_progressive() {
                    'p'
                } else {
                    'i'
                };
                format!(
                    "{}{scan}{}",
                    self.height,
                    format_significant(self.frame_rate.frames_per_second(), 4)
                )
            }
        }
    }

    /// Finds a catalog entry by its name, ignoring ASCII case.
    pub fn by_name(name: &str) -> Option<&'static Self> {
        DISPLAY_MODES
            .iter()
            .find(|m| m.name().eq_ignore_ascii_case(name.trim()))
    }
}

/// Formats `value` with `digits` significant digits, dropping trailing zeros.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn format_significant(value: f64, digits: usize) -> String {
    if value == 0.0 || !value.is_finite() {
        return "0".to_string();
    }
    let magnitude = value.abs().log10().floor() as i32 + 1;
    let decimals = (digits as i32 - magnitude).max(0) as usize;
    let text = format!("{value:.decimals$}");
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}

/// Every mode the emulated device supports.
pub static DISPLAY_MODES: [DisplayModeInfo; 16] = [
    DisplayModeInfo::entry(DisplayMode::NTSC, 720, 486, 30000, 1001),
    DisplayModeInfo::entry(DisplayMode::PAL, 720, 576, 25000, 1000),
    DisplayModeInfo::entry(DisplayMode::HD1080P2398, 1920, 1080, 24000, 1001),
    DisplayModeInfo::entry(DisplayMode::HD1080P24, 1920, 1080, 24000, 1000),
    DisplayModeInfo::entry(DisplayMode::HD1080P25, 1920, 1080, 25000, 1000),
    DisplayModeInfo::entry(DisplayMode::HD1080P2997, 1920, 1080, 30000, 1001),
    DisplayModeInfo::entry(DisplayMode::HD1080P30, 1920, 1080, 30000, 1000),
    DisplayModeInfo::entry(DisplayMode::HD1080I50, 1920, 1080, 50000, 1000),
    DisplayModeInfo::entry(DisplayMode::HD1080I5994, 1920, 1080, 60000, 1001),
    DisplayModeInfo::entry(DisplayMode::HD1080I6000, 1920, 1080, 60000, 1000),
    DisplayModeInfo::entry(DisplayMode::HD1080P50, 1920, 1080, 50000, 1000),
    DisplayModeInfo::entry(DisplayMode::HD1080P5994, 1920, 1080, 60000, 1001),
    DisplayModeInfo::entry(DisplayMode::HD1080P6000, 1920, 1080, 60000, 1000),
    DisplayModeInfo::entry(DisplayMode::HD720P50, 1280, 720, 50000, 1000),
    DisplayModeInfo::entry(DisplayMode::HD720P5994, 1280, 720, 60000, 1001),
    DisplayModeInfo::entry(DisplayMode::HD720P60, 1280, 720, 60000, 1000),
];
