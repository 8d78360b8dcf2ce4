//! Static capability attributes reported by every emulated device.

use serde::{Deserialize, Serialize};

/// API version the emulation reports, `10.9` packed as `0xMMmm0000`.
pub const API_VERSION: u32 = 0x0a09_0000;
pub const API_VERSION_STRING: &str = "10.9";

/// Capability flags and counts of an emulated output device.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceAttributes {
    pub supports_internal_keying: bool,
    pub supports_external_keying: bool,
    pub supports_hd_keying: bool,
    pub maximum_audio_channels: u32,
    pub supports_input_format_detection: bool,
    pub has_serial_port: bool,
    pub number_of_subdevices: u32,
    pub subdevice_index: u32,
    pub supports_full_duplex: bool,
    pub persistent_id: i64,
    pub topological_id: i64,
    /// Bit mask of video output connectors.
    pub video_output_connections: u32,
    /// Bit mask of audio output connectors.
    pub audio_output_connections: u32,
    pub video_input_connections: u32,
    pub audio_input_connections: u32,
}

impl Default for DeviceAttributes {
    fn default() -> Self {
        Self {
            supports_internal_keying: false,
            supports_external_keying: false,
            supports_hd_keying: true,
            // Hosts request 16 channels regardless; the writer negotiates down.
            maximum_audio_channels: 16,
            supports_input_format_detection: true,
            has_serial_port: false,
            number_of_subdevices: 1,
            subdevice_index: 0,
            supports_full_duplex: true,
            persistent_id: 0,
            topological_id: 0,
            video_output_connections: (1 << 6) - 1,
            audio_output_connections: (1 << 5) - 1,
            video_input_connections: 0,
            audio_input_connections: 0,
        }
    }
}

impl DeviceAttributes {
    /// True if the device can play out to at least one connector.
    pub const fn has_outputs(&self) -> bool {
        self.video_output_connections != 0 || self.audio_output_connections != 0
    }
}
