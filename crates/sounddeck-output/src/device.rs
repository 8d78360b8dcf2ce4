//! Device discovery.
//!
//! Sound devices come from the PCM backend. A vendor driver, when the host
//! has one, is injected as a [`DeviceSource`] and its devices are listed
//! after the sound devices.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use sounddeck_core::{DeviceAttributes, OutputConfig, Result};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::audio::PcmBackend;
use crate::contract::PlaybackOutput;
use crate::output::SoundOutput;

/// A playback device offered by an injected driver.
pub trait ExternalDevice: Send + Sync {
    fn display_name(&self) -> String;

    fn attributes(&self) -> DeviceAttributes;

    fn open_output(&self) -> Result<Box<dyn PlaybackOutput>>;
}

/// An injected driver that can enumerate its own devices.
pub trait DeviceSource: Send + Sync {
    fn devices(&self) -> Result<Vec<Arc<dyn ExternalDevice>>>;
}

/// A sound device emulating a playback card.
#[derive(Clone)]
pub struct SoundDevice {
    id: String,
    display_name: String,
    backend: Arc<dyn PcmBackend>,
}

impl SoundDevice {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        backend: Arc<dyn PcmBackend>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            backend,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn attributes(&self) -> DeviceAttributes {
        DeviceAttributes::default()
    }

    /// Opens an output on this device. The configured device id is
    /// replaced by this device's id.
    pub fn open_output(&self, config: &OutputConfig) -> SoundOutput {
        let config = OutputConfig {
            device: self.id.clone(),
            ..config.clone()
        };
        SoundOutput::with_backend(config, Arc::clone(&self.backend))
    }
}

impl fmt::Debug for SoundDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoundDevice")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

/// A discovered device, resolved once to its concrete kind.
#[derive(Clone)]
pub enum DeviceHandle {
    Sound(SoundDevice),
    External(Arc<dyn ExternalDevice>),
}

impl DeviceHandle {
    pub fn display_name(&self) -> String {
        match self {
            Self::Sound(device) => device.display_name().to_string(),
            Self::External(device) => device.display_name(),
        }
    }

    pub fn attributes(&self) -> DeviceAttributes {
        match self {
            Self::Sound(device) => device.attributes(),
            Self::External(device) => device.attributes(),
        }
    }

    pub const fn is_external(&self) -> bool {
        matches!(self, Self::External(_))
    }

    /// Opens the device's playback output.
    pub fn open_output(&self, config: &OutputConfig) -> Result<Box<dyn PlaybackOutput>> {
        match self {
            Self::Sound(device) => Ok(Box::new(device.open_output(config))),
            Self::External(device) => device.open_output(),
        }
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sound(device) => f.debug_tuple("Sound").field(device).finish(),
            Self::External(device) => f
                .debug_tuple("External")
                .field(&device.display_name())
                .finish(),
        }
    }
}

/// Lists sound devices, then the injected driver's devices. A failing
/// driver is logged and skipped; a failing sound backend is an error.
pub fn discover(
    backend: &Arc<dyn PcmBackend>,
    external: Option<&dyn DeviceSource>,
) -> Result<Vec<DeviceHandle>> {
    let mut devices: Vec<DeviceHandle> = backend
        .playback_devices()?
        .into_iter()
        .map(|info| DeviceHandle::Sound(SoundDevice::new(info.id, info.name, Arc::clone(backend))))
        .collect();
    debug!("Found {} sound devices", devices.len());

    if let Some(source) = external {
        match source.devices() {
            Ok(found) => {
                debug!("Found {} driver devices", found.len());
                devices.extend(found.into_iter().map(DeviceHandle::External));
            }
            Err(e) => warn!("Device driver enumeration failed: {e}"),
        }
    }

    Ok(devices)
}
