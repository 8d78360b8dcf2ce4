//! Audio output writer.
//!
//! Owns at most one open device session. Enabling negotiates access, rate,
//! sample format and channel count; the device may accept fewer channels
//! than the host asked for, in which case every write keeps the leading
//! channels of each frame and drops the rest.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use parking_lot::Mutex;
use sounddeck_core::{AudioOutputSettings, AudioStreamType, Error, Result, SampleType};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::{PcmAccess, PcmBackend, PcmDevice, PcmState};

/// What the device actually agreed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedFormat {
    pub sample_rate: u32,
    pub sample_type: SampleType,
    /// Channels per frame in the host's buffers.
    pub requested_channels: u32,
    /// Channels per frame accepted by the device.
    pub physical_channels: u32,
    pub stream_type: AudioStreamType,
}

impl NegotiatedFormat {
    pub const fn sample_width(&self) -> usize {
        self.sample_type.width_bytes()
    }
}

struct AudioSession {
    pcm: Box<dyn PcmDevice>,
    format: NegotiatedFormat,
    /// Repacked frames, reused across writes.
    scratch: Vec<u8>,
}

impl AudioSession {
    fn write(&mut self, buffer: &[u8], frames: usize) -> usize {
        if self.pcm.state() == PcmState::Xrun {
            debug!("Device in underrun, re-priming before write");
            if let Err(e) = self.pcm.prepare() {
                warn!("Failed to re-prime device: {e}");
            }
        }

        let frames = repack_channels(
            buffer,
            frames,
            self.format.requested_channels as usize,
            self.format.physical_channels as usize,
            self.format.sample_width(),
            &mut self.scratch,
        );
        if frames == 0 {
            return 0;
        }

        match self.pcm.write_interleaved(&self.scratch, frames) {
            Ok(written) => written,
            Err(first) => {
                warn!("Audio write failed ({first}), re-priming and retrying once");
                if let Err(e) = self.pcm.prepare() {
                    warn!("Failed to re-prime device: {e}");
                }
                match self.pcm.write_interleaved(&self.scratch, frames) {
                    Ok(written) => written,
                    Err(e) => {
                        error!("Audio write retry failed: {e}");
                        0
                    }
                }
            }
        }
    }
}

/// Writes host audio to the sound device.
pub struct AudioOutputWriter {
    backend: Arc<dyn PcmBackend>,
    device: String,
    session: Mutex<Option<AudioSession>>,
}

impl AudioOutputWriter {
    pub fn new(backend: Arc<dyn PcmBackend>, device: impl Into<String>) -> Self {
        Self {
            backend,
            device: device.into(),
            session: Mutex::new(None),
        }
    }

    /// Identifier of the sound device this writer opens.
    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn is_enabled(&self) -> bool {
        self.session.lock().is_some()
    }

    pub fn format(&self) -> Option<NegotiatedFormat> {
        self.session.lock().as_ref().map(|s| s.format)
    }

    /// Opens and configures the device. Any failure leaves no session open.
    pub fn enable(&self, settings: &AudioOutputSettings) -> Result<NegotiatedFormat> {
        if settings.channel_count == 0 {
            return Err(Error::InvalidArgument("channel count must be positive".into()));
        }
        if settings.sample_rate == 0 {
            return Err(Error::InvalidArgument("sample rate must be positive".into()));
        }

        let mut session = self.session.lock();
        if session.take().is_some() {
            debug!("Closing previous audio session");
        }

        let mut pcm = self.backend.open_playback(&self.device)?;
        let format = negotiate(pcm.as_mut(), settings).inspect_err(|e| {
            error!("Audio negotiation with {} failed: {e}", self.device);
        })?;

        info!(
            "Audio output enabled on {}: {} Hz, {}-bit, {} of {} channels",
            self.device,
            format.sample_rate,
            format.sample_type.bits(),
            format.physical_channels,
            format.requested_channels
        );

        *session = Some(AudioSession {
            pcm,
            format,
            scratch: Vec::new(),
        });
        Ok(format)
    }

    /// Drains pending audio and closes the device.
    pub fn disable(&self) -> Result<()> {
        let mut session = self
            .session
            .lock()
            .take()
            .ok_or(Error::AudioOutputNotEnabled)?;

        if let Err(e) = session.pcm.drain() {
            warn!("Failed to drain audio before close: {e}");
        }
        drop(session);
        info!("Audio output disabled");
        Ok(())
    }

    /// Writes `sample_frame_count` interleaved frames, returning how many the
    /// device took. Writes nothing when no session is open.
    pub fn write(&self, buffer: &[u8], sample_frame_count: u32) -> u32 {
        let mut guard = self.session.lock();
        let Some(session) = guard.as_mut() else {
            return 0;
        };
        let written = session.write(buffer, sample_frame_count as usize);
        u32::try_from(written).unwrap_or(u32::MAX)
    }

    /// Re-primes an open device; a no-op without a session.
    pub fn reprime(&self) -> Result<()> {
        match self.session.lock().as_mut() {
            Some(session) => session.pcm.prepare(),
            None => Ok(()),
        }
    }

    /// Lets queued audio play out, then stops the device. The session stays
    /// open and needs a re-prime before further writes.
    pub fn drain_and_drop(&self) -> Result<()> {
        let mut guard = self.session.lock();
        let Some(session) = guard.as_mut() else {
            return Ok(());
        };
        session.pcm.drain()?;
        session.pcm.drop_pending()
    }

    /// Closes the device if open. Safe to call any number of times.
    pub fn close(&self) -> bool {
        let closed = self.session.lock().take().is_some();
        if closed {
            debug!("Audio device closed");
        }
        closed
    }
}

fn negotiate(pcm: &mut dyn PcmDevice, settings: &AudioOutputSettings) -> Result<NegotiatedFormat> {
    pcm.set_access(PcmAccess::RwInterleaved)?;
    let sample_rate = pcm.set_rate_near(settings.sample_rate)?;
    pcm.set_format(settings.sample_type.into())?;

    let physical_channels = (1..=settings.channel_count)
        .rev()
        .find(|&channels| pcm.set_channels(channels).is_ok())
        .ok_or_else(|| {
            Error::DeviceNegotiation(format!(
                "no channel count between 1 and {} accepted",
                settings.channel_count
            ))
        })?;
    if physical_channels < settings.channel_count {
        debug!(
            "Device accepted {physical_channels} of {} channels",
            settings.channel_count
        );
    }

    pcm.commit()?;

    Ok(NegotiatedFormat {
        sample_rate,
        sample_type: settings.sample_type,
        requested_channels: settings.channel_count,
        physical_channels,
        stream_type: settings.stream_type,
    })
}

/// Copies the leading `physical` channels of each `requested`-channel frame
/// of `input` into `out`. Returns the number of whole frames packed, which
/// is capped by the length of `input`.
pub fn repack_channels(
    input: &[u8],
    frames: usize,
    requested: usize,
    physical: usize,
    sample_width: usize,
    out: &mut Vec<u8>,
) -> usize {
    out.clear();
    let in_stride = requested * sample_width;
    let out_stride = physical.min(requested) * sample_width;
    if in_stride == 0 || out_stride == 0 {
        return 0;
    }

    let frames = frames.min(input.len() / in_stride);
    out.reserve(frames * out_stride);
    for frame in input.chunks_exact(in_stride).take(frames) {
        out.extend_from_slice(&frame[..out_stride]);
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::PcmFormat;
    use crate::testing::{Call, MockBackend};
    use proptest::prelude::*;

    fn writer(backend: &MockBackend) -> AudioOutputWriter {
        AudioOutputWriter::new(Arc::new(backend.clone()), "mock")
    }

    /// `frames` frames of `channels` i16 samples valued `frame * 100 + channel`.
    fn interleaved_i16(frames: usize, channels: usize) -> Vec<u8> {
        let mut bytes = Vec::new();
        for frame in 0..frames {
            for channel in 0..channels {
                let value = i16::try_from(frame * 100 + channel).unwrap();
                bytes.extend_from_slice(&value.to_le_bytes());
            }
        }
        bytes
    }

    fn decode_i16(bytes: &[u8]) -> Vec<i16> {
        bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    #[test]
    fn test_negotiates_channels_down() {
        let backend = MockBackend::new();
        let writer = writer(&backend);
        let format = writer
            .enable(&AudioOutputSettings::new(48000, SampleType::Int16, 8))
            .unwrap();

        assert_eq!(format.requested_channels, 8);
        assert_eq!(format.physical_channels, 2);
        assert_eq!(format.sample_rate, 48000);
        assert_eq!(
            backend.calls(),
            [
                Call::Open("mock".into()),
                Call::SetAccess,
                Call::SetRate(48000),
                Call::SetFormat(PcmFormat::S16Le),
                Call::SetChannels(8),
                Call::SetChannels(7),
                Call::SetChannels(6),
                Call::SetChannels(5),
                Call::SetChannels(4),
                Call::SetChannels(3),
                Call::SetChannels(2),
                Call::Commit,
            ]
        );
    }

    #[test]
    fn test_rate_is_nearest_supported() {
        let backend = MockBackend::new();
        backend.script().supported_rate = 44100;
        let writer = writer(&backend);
        let format = writer
            .enable(&AudioOutputSettings::new(48000, SampleType::Int32, 2))
            .unwrap();
        assert_eq!(format.sample_rate, 44100);
        assert_eq!(format.sample_width(), 4);
    }

    #[test]
    fn test_write_keeps_leading_channels_only() {
        let backend = MockBackend::new();
        let writer = writer(&backend);
        writer
            .enable(&AudioOutputSettings::new(48000, SampleType::Int16, 8))
            .unwrap();

        let input = interleaved_i16(4, 8);
        assert_eq!(writer.write(&input, 4), 4);

        let written = decode_i16(&backend.script().written);
        assert_eq!(written, [0, 1, 100, 101, 200, 201, 300, 301]);
    }

    #[test]
    fn test_write_without_session_writes_nothing() {
        let backend = MockBackend::new();
        let writer = writer(&backend);
        assert_eq!(writer.write(&interleaved_i16(4, 2), 4), 0);
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_short_buffer_caps_frame_count() {
        let backend = MockBackend::new();
        let writer = writer(&backend);
        writer
            .enable(&AudioOutputSettings::new(48000, SampleType::Int16, 2))
            .unwrap();
        assert_eq!(writer.write(&interleaved_i16(3, 2), 10), 3);
    }

    #[test]
    fn test_underrun_retries_exactly_once() {
        let backend = MockBackend::new();
        let writer = writer(&backend);
        writer
            .enable(&AudioOutputSettings::new(48000, SampleType::Int16, 2))
            .unwrap();
        backend.script().failing_writes = 1;
        backend.clear_calls();

        assert_eq!(writer.write(&interleaved_i16(16, 2), 16), 16);
        assert_eq!(
            backend.calls(),
            [Call::Write(16), Call::Prepare, Call::Write(16)]
        );
    }

    #[test]
    fn test_failed_retry_reports_zero_frames() {
        let backend = MockBackend::new();
        let writer = writer(&backend);
        writer
            .enable(&AudioOutputSettings::new(48000, SampleType::Int16, 2))
            .unwrap();
        backend.script().failing_writes = 5;
        backend.clear_calls();

        assert_eq!(writer.write(&interleaved_i16(16, 2), 16), 0);
        assert_eq!(backend.count(|c| matches!(c, Call::Prepare)), 1);
        assert_eq!(backend.count(|c| matches!(c, Call::Write(_))), 2);
        assert_eq!(backend.script().failing_writes, 3);
    }

    #[test]
    fn test_device_in_underrun_is_reprimed_before_write() {
        let backend = MockBackend::new();
        let writer = writer(&backend);
        writer
            .enable(&AudioOutputSettings::new(48000, SampleType::Int16, 2))
            .unwrap();
        backend.script().xrun = true;
        backend.clear_calls();

        assert_eq!(writer.write(&interleaved_i16(8, 2), 8), 8);
        assert_eq!(backend.calls(), [Call::Prepare, Call::Write(8)]);
    }

    #[test]
    fn test_negotiation_failure_leaves_no_session() {
        let backend = MockBackend::new();
        backend.script().fail_commit = true;
        let writer = writer(&backend);

        let err = writer
            .enable(&AudioOutputSettings::new(48000, SampleType::Int16, 2))
            .unwrap_err();
        assert!(err.is_device_failure());
        assert!(!writer.is_enabled());
        assert_eq!(backend.calls().last(), Some(&Call::Close));
    }

    #[test]
    fn test_open_failure() {
        let backend = MockBackend::new();
        backend.script().fail_open = true;
        let writer = writer(&backend);
        let err = writer.enable(&AudioOutputSettings::default()).unwrap_err();
        assert!(matches!(err, Error::DeviceOpen(_)));
        assert!(!writer.is_enabled());
    }

    #[test]
    fn test_no_accepted_channel_count_fails() {
        let backend = MockBackend::new();
        backend.script().max_channels = 0;
        let writer = writer(&backend);
        let err = writer
            .enable(&AudioOutputSettings::new(48000, SampleType::Int16, 3))
            .unwrap_err();
        assert!(matches!(err, Error::DeviceNegotiation(_)));
        assert!(!writer.is_enabled());
    }

    #[test]
    fn test_zero_channels_rejected_before_open() {
        let backend = MockBackend::new();
        let writer = writer(&backend);
        let err = writer
            .enable(&AudioOutputSettings::new(48000, SampleType::Int16, 0))
            .unwrap_err();
        assert!(err.is_unsupported_configuration());
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_disable_drains_then_closes() {
        let backend = MockBackend::new();
        let writer = writer(&backend);
        assert!(matches!(writer.disable(), Err(Error::AudioOutputNotEnabled)));

        writer.enable(&AudioOutputSettings::default()).unwrap();
        backend.clear_calls();
        writer.disable().unwrap();
        assert_eq!(backend.calls(), [Call::Drain, Call::Close]);

        // Teardown after disable has nothing left to close.
        assert!(!writer.close());
    }

    #[test]
    fn test_reenable_closes_previous_session() {
        let backend = MockBackend::new();
        let writer = writer(&backend);
        writer.enable(&AudioOutputSettings::default()).unwrap();
        writer.enable(&AudioOutputSettings::default()).unwrap();
        assert_eq!(backend.count(|c| matches!(c, Call::Open(_))), 2);
        assert_eq!(backend.count(|c| matches!(c, Call::Close)), 1);
    }

    #[test]
    fn test_drain_and_drop_keeps_session() {
        let backend = MockBackend::new();
        let writer = writer(&backend);
        writer.enable(&AudioOutputSettings::default()).unwrap();
        backend.clear_calls();

        writer.drain_and_drop().unwrap();
        writer.reprime().unwrap();
        assert_eq!(backend.calls(), [Call::Drain, Call::Drop, Call::Prepare]);
        assert!(writer.is_enabled());
        assert!(writer.close());
    }

    proptest! {
        #[test]
        fn prop_repack_copies_leading_channels(
            requested in 1usize..16,
            physical in 1usize..16,
            frames in 0usize..64,
            width in prop::sample::select(vec![2usize, 4]),
        ) {
            let physical = physical.min(requested);
            let input: Vec<u8> = (0..frames * requested * width)
                .map(|i| u8::try_from(i % 251).unwrap())
                .collect();
            let mut out = Vec::new();

            let packed = repack_channels(&input, frames, requested, physical, width, &mut out);
            prop_assert_eq!(packed, frames);
            prop_assert_eq!(out.len(), frames * physical * width);
            for frame in 0..frames {
                let src = &input[frame * requested * width..][..physical * width];
                let dst = &out[frame * physical * width..][..physical * width];
                prop_assert_eq!(src, dst);
            }
        }
    }
}
