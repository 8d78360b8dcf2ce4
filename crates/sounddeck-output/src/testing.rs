//! Scripted sound device and frames for unit tests.

use parking_lot::{Mutex, MutexGuard};
use sounddeck_core::{Error, Result};
use std::sync::Arc;

use crate::audio::{PcmAccess, PcmBackend, PcmDevice, PcmDeviceInfo, PcmFormat, PcmState};
use crate::frame::{FrameHandle, VideoFrame};

/// A frame whose width doubles as an identifier.
pub struct TestFrame {
    id: u32,
}

impl VideoFrame for TestFrame {
    fn width(&self) -> u32 {
        self.id
    }

    fn height(&self) -> u32 {
        1
    }

    fn row_bytes(&self) -> usize {
        0
    }

    fn bytes(&self) -> &[u8] {
        &[]
    }
}

pub fn test_frame(id: usize) -> FrameHandle {
    Arc::new(TestFrame {
        id: u32::try_from(id).unwrap_or(u32::MAX),
    })
}

/// A device operation as seen by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Open(String),
    SetAccess,
    SetRate(u32),
    SetFormat(PcmFormat),
    SetChannels(u32),
    Commit,
    Prepare,
    Write(usize),
    Drain,
    Drop,
    Close,
}

/// Behaviour of the mock device, adjustable mid-test.
pub struct MockScript {
    /// Largest channel count the device accepts.
    pub max_channels: u32,
    /// Rate returned from every rate negotiation.
    pub supported_rate: u32,
    pub fail_open: bool,
    pub fail_commit: bool,
    /// Upcoming writes that fail with an underrun.
    pub failing_writes: usize,
    /// Device reports an underrun until the next prepare.
    pub xrun: bool,
    pub calls: Vec<Call>,
    /// Bytes of every successful write, in order.
    pub written: Vec<u8>,
}

impl Default for MockScript {
    fn default() -> Self {
        Self {
            max_channels: 2,
            supported_rate: 48000,
            fail_open: false,
            fail_commit: false,
            failing_writes: 0,
            xrun: false,
            calls: Vec::new(),
            written: Vec::new(),
        }
    }
}

#[derive(Clone, Default)]
pub struct MockBackend {
    script: Arc<Mutex<MockScript>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self) -> MutexGuard<'_, MockScript> {
        self.script.lock()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.script.lock().calls.clear();
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.script.lock().calls.iter().filter(|c| predicate(*c)).count()
    }
}

impl PcmBackend for MockBackend {
    fn playback_devices(&self) -> Result<Vec<PcmDeviceInfo>> {
        Ok(vec![PcmDeviceInfo {
            id: "mock".into(),
            name: "Mock Output".into(),
        }])
    }

    fn open_playback(&self, device: &str) -> Result<Box<dyn PcmDevice>> {
        let mut script = self.script.lock();
        script.calls.push(Call::Open(device.to_string()));
        if script.fail_open {
            return Err(Error::DeviceOpen(format!("{device} is busy")));
        }
        Ok(Box::new(MockPcm {
            script: Arc::clone(&self.script),
            state: PcmState::Setup,
        }))
    }
}

struct MockPcm {
    script: Arc<Mutex<MockScript>>,
    state: PcmState,
}

impl MockPcm {
    fn record(&self, call: Call) -> MutexGuard<'_, MockScript> {
        let mut script = self.script.lock();
        script.calls.push(call);
        script
    }
}

impl PcmDevice for MockPcm {
    fn set_access(&mut self, _access: PcmAccess) -> Result<()> {
        self.record(Call::SetAccess);
        Ok(())
    }

    fn set_rate_near(&mut self, rate: u32) -> Result<u32> {
        Ok(self.record(Call::SetRate(rate)).supported_rate)
    }

    fn set_format(&mut self, format: PcmFormat) -> Result<()> {
        self.record(Call::SetFormat(format));
        Ok(())
    }

    fn set_channels(&mut self, channels: u32) -> Result<()> {
        if channels <= self.record(Call::SetChannels(channels)).max_channels {
            Ok(())
        } else {
            Err(Error::DeviceNegotiation(format!("{channels} channels")))
        }
    }

    fn commit(&mut self) -> Result<()> {
        if self.record(Call::Commit).fail_commit {
            return Err(Error::DeviceCommit("rejected".into()));
        }
        self.state = PcmState::Prepared;
        Ok(())
    }

    fn state(&self) -> PcmState {
        if self.script.lock().xrun {
            PcmState::Xrun
        } else {
            self.state
        }
    }

    fn prepare(&mut self) -> Result<()> {
        self.record(Call::Prepare).xrun = false;
        self.state = PcmState::Prepared;
        Ok(())
    }

    fn write_interleaved(&mut self, data: &[u8], frames: usize) -> Result<usize> {
        let mut script = self.record(Call::Write(frames));
        if script.failing_writes > 0 {
            script.failing_writes -= 1;
            return Err(Error::Underrun);
        }
        script.written.extend_from_slice(data);
        drop(script);
        self.state = PcmState::Running;
        Ok(frames)
    }

    fn drain(&mut self) -> Result<()> {
        self.record(Call::Drain);
        self.state = PcmState::Setup;
        Ok(())
    }

    fn drop_pending(&mut self) -> Result<()> {
        self.record(Call::Drop);
        self.state = PcmState::Setup;
        Ok(())
    }
}

impl Drop for MockPcm {
    fn drop(&mut self) {
        self.record(Call::Close);
    }
}
