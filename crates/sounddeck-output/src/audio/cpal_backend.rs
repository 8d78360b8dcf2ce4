//! Sound device backend using cpal.
//!
//! cpal is callback driven, so each committed device gets a sample ring and
//! a dedicated thread that owns the stream (`cpal::Stream` is not `Send`).
//! Writes block until the ring has room. When the callback runs dry after
//! playback has begun, the device reports an underrun until re-primed.

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    BufferSize, Device, FromSample, Host, Sample, SampleFormat, SampleRate, SizedSample, Stream,
    StreamConfig, SupportedStreamConfigRange,
};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use sounddeck_core::{config::DEFAULT_DEVICE, Error, OutputConfig, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

use super::ring::SampleRing;
use super::{PcmAccess, PcmBackend, PcmDevice, PcmDeviceInfo, PcmFormat, PcmState};

/// Stream sample formats in order of preference.
const STREAM_FORMATS: [SampleFormat; 4] = [
    SampleFormat::F32,
    SampleFormat::I32,
    SampleFormat::I16,
    SampleFormat::U16,
];

/// Sleep between attempts to push into a full ring.
const WRITE_BACKOFF: Duration = Duration::from_millis(1);

/// Opens devices on the default cpal host.
#[derive(Debug, Clone)]
pub struct CpalBackend {
    ring_ms: u32,
    drain_timeout: Duration,
}

impl CpalBackend {
    pub fn new(config: &OutputConfig) -> Self {
        Self {
            ring_ms: config.ring_buffer_ms,
            drain_timeout: config.drain_timeout(),
        }
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new(&OutputConfig::default())
    }
}

impl PcmBackend for CpalBackend {
    fn playback_devices(&self) -> Result<Vec<PcmDeviceInfo>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| Error::DeviceOpen(format!("Failed to list devices: {e}")))?
            .filter_map(|d| d.name().ok())
            .map(|name| PcmDeviceInfo {
                id: name.clone(),
                name,
            })
            .collect();
        Ok(devices)
    }

    fn open_playback(&self, device: &str) -> Result<Box<dyn PcmDevice>> {
        let host = cpal::default_host();
        let handle = find_device(&host, device)?;

        let ranges: Vec<ConfigRange> = handle
            .supported_output_configs()
            .map_err(|e| Error::DeviceOpen(format!("Failed to query {device}: {e}")))?
            .map(ConfigRange::from)
            .filter(|range| STREAM_FORMATS.contains(&range.format))
            .collect();
        if ranges.is_empty() {
            return Err(Error::DeviceOpen(format!(
                "{device} has no usable output configuration"
            )));
        }

        info!("Opened sound device {device}");
        debug!("Supported output configs: {ranges:?}");
        Ok(Box::new(CpalPcm::new(
            device.to_string(),
            ranges,
            self.ring_ms,
            self.drain_timeout,
        )))
    }
}

fn find_device(host: &Host, name: &str) -> Result<Device> {
    if name == DEFAULT_DEVICE {
        return host
            .default_output_device()
            .ok_or_else(|| Error::DeviceOpen("No output device found".to_string()));
    }
    host.output_devices()
        .map_err(|e| Error::DeviceOpen(format!("Failed to list devices: {e}")))?
        .find(|d| d.name().is_ok_and(|n| n == name))
        .ok_or_else(|| Error::DeviceOpen(format!("No output device named {name}")))
}

/// One supported channels/rate/format combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ConfigRange {
    channels: u16,
    min_rate: u32,
    max_rate: u32,
    format: SampleFormat,
}

impl ConfigRange {
    const fn contains_rate(&self, rate: u32) -> bool {
        self.min_rate <= rate && rate <= self.max_rate
    }

    fn accepts(&self, channels: u32, rate: u32) -> bool {
        u32::from(self.channels) == channels && self.contains_rate(rate)
    }
}

impl From<SupportedStreamConfigRange> for ConfigRange {
    fn from(range: SupportedStreamConfigRange) -> Self {
        Self {
            channels: range.channels(),
            min_rate: range.min_sample_rate().0,
            max_rate: range.max_sample_rate().0,
            format: range.sample_format(),
        }
    }
}

/// The supported rate closest to `rate`.
fn nearest_rate(ranges: &[ConfigRange], rate: u32) -> Option<u32> {
    ranges
        .iter()
        .map(|range| rate.clamp(range.min_rate, range.max_rate))
        .min_by_key(|candidate| candidate.abs_diff(rate))
}

/// Preferred stream format for a channel count and rate.
fn stream_format(ranges: &[ConfigRange], channels: u32, rate: u32) -> Option<SampleFormat> {
    STREAM_FORMATS.into_iter().find(|format| {
        ranges
            .iter()
            .any(|range| range.format == *format && range.accepts(channels, rate))
    })
}

/// Decodes little-endian integer samples to `f32`.
fn decode_samples(data: &[u8], format: PcmFormat, out: &mut Vec<f32>) {
    out.clear();
    match format {
        PcmFormat::S16Le => out.extend(
            data.chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]]).to_sample::<f32>()),
        ),
        PcmFormat::S32Le => out.extend(
            data.chunks_exact(4)
                .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]).to_sample::<f32>()),
        ),
    }
}

/// Pushes whole interleaved frames into the ring, blocking while it is full.
/// Gives up once `timeout` passes without progress. Returns the number of
/// samples pushed, always a multiple of `channels`.
fn push_frames(ring: &SampleRing, samples: &[f32], channels: usize, timeout: Duration) -> usize {
    let channels = channels.max(1);
    let total = samples.len() / channels * channels;
    let mut offset = 0;
    let mut deadline = Instant::now() + timeout;
    while offset < total {
        let room = ring.free() / channels * channels;
        let written = ring.write(&samples[offset..total.min(offset + room)]);
        if written > 0 {
            offset += written;
            deadline = Instant::now() + timeout;
            continue;
        }
        if Instant::now() >= deadline {
            warn!("Sound device stopped consuming samples");
            break;
        }
        std::thread::sleep(WRITE_BACKOFF);
    }
    offset
}

/// State shared with the stream callback.
struct StreamShared {
    ring: SampleRing,
    /// Set by the callback when it runs dry while armed.
    xrun: AtomicBool,
    /// Set by the first write after a prepare.
    armed: AtomicBool,
}

impl StreamShared {
    fn new(capacity: usize) -> Self {
        Self {
            ring: SampleRing::new(capacity),
            xrun: AtomicBool::new(false),
            armed: AtomicBool::new(false),
        }
    }

    fn reset(&self) {
        self.ring.clear();
        self.armed.store(false, Ordering::Release);
        self.xrun.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy)]
enum StreamControl {
    Play,
    Pause,
    Close,
}

/// The stream thread and the means to reach it.
struct StreamHandle {
    shared: Arc<StreamShared>,
    control: Sender<StreamControl>,
    thread: Option<JoinHandle<()>>,
}

impl StreamHandle {
    fn send(&self, message: StreamControl) {
        if self.control.send(message).is_err() {
            debug!("PCM stream thread already gone, dropping {message:?}");
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.send(StreamControl::Close);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("PCM stream thread panicked");
            }
        }
    }
}

/// An open cpal output device.
pub struct CpalPcm {
    device: String,
    ranges: Vec<ConfigRange>,
    ring_ms: u32,
    drain_timeout: Duration,
    rate: Option<u32>,
    format: Option<PcmFormat>,
    channels: Option<u32>,
    state: PcmState,
    stream: Option<StreamHandle>,
    /// Decoded samples, reused across writes.
    samples: Vec<f32>,
}

impl CpalPcm {
    fn new(
        device: String,
        ranges: Vec<ConfigRange>,
        ring_ms: u32,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            device,
            ranges,
            ring_ms,
            drain_timeout,
            rate: None,
            format: None,
            channels: None,
            state: PcmState::Setup,
            stream: None,
            samples: Vec::new(),
        }
    }

    fn stream(&self) -> Result<&StreamHandle> {
        self.stream
            .as_ref()
            .ok_or_else(|| Error::AudioOutput("Device parameters not committed".to_string()))
    }
}

impl PcmDevice for CpalPcm {
    fn set_access(&mut self, access: PcmAccess) -> Result<()> {
        trace!("Access {access:?} on {}", self.device);
        Ok(())
    }

    fn set_rate_near(&mut self, rate: u32) -> Result<u32> {
        let chosen = nearest_rate(&self.ranges, rate)
            .ok_or_else(|| Error::DeviceNegotiation("No supported sample rate".to_string()))?;
        if chosen != rate {
            debug!("Requested {rate} Hz, device offers {chosen} Hz");
        }
        self.rate = Some(chosen);
        Ok(chosen)
    }

    fn set_format(&mut self, format: PcmFormat) -> Result<()> {
        // Samples are converted on the way into the ring, so every host
        // format maps onto any stream format.
        self.format = Some(format);
        Ok(())
    }

    fn set_channels(&mut self, channels: u32) -> Result<()> {
        let rate = self.rate.ok_or_else(|| {
            Error::DeviceNegotiation("Rate must be set before channels".to_string())
        })?;
        if self.ranges.iter().any(|range| range.accepts(channels, rate)) {
            self.channels = Some(channels);
            Ok(())
        } else {
            Err(Error::DeviceNegotiation(format!(
                "{} does not accept {channels} channels at {rate} Hz",
                self.device
            )))
        }
    }

    fn commit(&mut self) -> Result<()> {
        let (Some(rate), Some(channels), Some(_)) = (self.rate, self.channels, self.format) else {
            return Err(Error::DeviceCommit("Hardware parameters incomplete".to_string()));
        };
        let sample_format = stream_format(&self.ranges, channels, rate).ok_or_else(|| {
            Error::DeviceCommit(format!("No stream format for {channels} channels at {rate} Hz"))
        })?;
        let stream_channels = u16::try_from(channels)
            .map_err(|_| Error::DeviceCommit(format!("Too many channels: {channels}")))?;

        // Close any stream from an earlier commit first.
        self.stream = None;

        let capacity = rate as usize * channels as usize * self.ring_ms as usize / 1000;
        let shared = Arc::new(StreamShared::new(capacity));
        let config = StreamConfig {
            channels: stream_channels,
            sample_rate: SampleRate(rate),
            buffer_size: BufferSize::Default,
        };

        let (control_tx, control_rx) = unbounded();
        let (ready_tx, ready_rx) = bounded(1);
        let device = self.device.clone();
        let thread_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("sounddeck-pcm".to_string())
            .spawn(move || {
                run_stream(
                    &device,
                    &config,
                    sample_format,
                    thread_shared,
                    &control_rx,
                    &ready_tx,
                );
            })
            .map_err(|e| Error::DeviceCommit(format!("Failed to spawn stream thread: {e}")))?;

        let handle = StreamHandle {
            shared,
            control: control_tx,
            thread: Some(thread),
        };
        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(Error::DeviceCommit(
                    "Stream thread exited during setup".to_string(),
                ))
            }
        }

        info!(
            "Stream running on {}: {rate} Hz, {channels} channels, {sample_format:?}",
            self.device
        );
        self.stream = Some(handle);
        self.state = PcmState::Prepared;
        Ok(())
    }

    fn state(&self) -> PcmState {
        let xrun = self
            .stream
            .as_ref()
            .is_some_and(|s| s.shared.xrun.load(Ordering::Acquire));
        if self.state == PcmState::Running && xrun {
            PcmState::Xrun
        } else {
            self.state
        }
    }

    fn prepare(&mut self) -> Result<()> {
        let stream = self.stream()?;
        stream.shared.reset();
        stream.send(StreamControl::Play);
        self.state = PcmState::Prepared;
        Ok(())
    }

    fn write_interleaved(&mut self, data: &[u8], frames: usize) -> Result<usize> {
        match self.state() {
            PcmState::Xrun => return Err(Error::Underrun),
            PcmState::Setup => {
                return Err(Error::AudioOutput("Device not prepared".to_string()));
            }
            PcmState::Prepared | PcmState::Running => {}
        }
        let (Some(format), Some(channels)) = (self.format, self.channels) else {
            return Err(Error::AudioOutput("Device not configured".to_string()));
        };
        let Some(stream) = self.stream.as_ref() else {
            return Err(Error::AudioOutput("Device parameters not committed".to_string()));
        };

        let bytes = frames * channels as usize * format.width_bytes();
        let data = data.get(..bytes).ok_or_else(|| {
            Error::InvalidArgument(format!("Buffer holds fewer than {frames} frames"))
        })?;
        decode_samples(data, format, &mut self.samples);

        let channels = channels as usize;
        let pushed = push_frames(
            &stream.shared.ring,
            &self.samples,
            channels,
            self.drain_timeout,
        );

        stream.shared.armed.store(true, Ordering::Release);
        self.state = PcmState::Running;
        Ok(pushed / channels)
    }

    fn drain(&mut self) -> Result<()> {
        let Some(stream) = self.stream.as_ref() else {
            return Ok(());
        };
        let deadline = Instant::now() + self.drain_timeout;
        while !stream.shared.ring.is_empty() && Instant::now() < deadline {
            std::thread::sleep(WRITE_BACKOFF);
        }
        if !stream.shared.ring.is_empty() {
            warn!("Drain timed out, discarding remaining audio");
        }
        stream.shared.reset();
        stream.send(StreamControl::Pause);
        self.state = PcmState::Setup;
        Ok(())
    }

    fn drop_pending(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.as_ref() {
            stream.shared.reset();
            stream.send(StreamControl::Pause);
        }
        self.state = PcmState::Setup;
        Ok(())
    }
}

fn run_stream(
    device: &str,
    config: &StreamConfig,
    format: SampleFormat,
    shared: Arc<StreamShared>,
    control: &Receiver<StreamControl>,
    ready: &Sender<Result<()>>,
) {
    let stream = match open_stream(device, config, format, shared) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready.send(Err(Error::DeviceCommit(format!("Failed to start stream: {e}"))));
        return;
    }
    let _ = ready.send(Ok(()));

    while let Ok(message) = control.recv() {
        match message {
            StreamControl::Play => {
                if let Err(e) = stream.play() {
                    warn!("Failed to resume stream: {e}");
                }
            }
            StreamControl::Pause => {
                if let Err(e) = stream.pause() {
                    debug!("Stream does not support pause: {e}");
                }
            }
            StreamControl::Close => break,
        }
    }
    debug!("PCM stream closed");
}

fn open_stream(
    name: &str,
    config: &StreamConfig,
    format: SampleFormat,
    shared: Arc<StreamShared>,
) -> Result<Stream> {
    let host = cpal::default_host();
    let device = find_device(&host, name)?;

    match format {
        SampleFormat::F32 => build_stream::<f32>(&device, config, shared),
        SampleFormat::I32 => build_stream::<i32>(&device, config, shared),
        SampleFormat::I16 => build_stream::<i16>(&device, config, shared),
        SampleFormat::U16 => build_stream::<u16>(&device, config, shared),
        other => Err(Error::DeviceCommit(format!(
            "Unsupported sample format: {other:?}"
        ))),
    }
}

fn build_stream<T: SizedSample + FromSample<f32>>(
    device: &Device,
    config: &StreamConfig,
    shared: Arc<StreamShared>,
) -> Result<Stream> {
    let err_fn = |err| {
        error!("Audio stream error: {err}");
    };
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if scratch.len() < data.len() {
                    scratch.resize(data.len(), 0.0);
                }
                let read = shared.ring.read(&mut scratch[..data.len()]);

                for (i, sample) in data.iter_mut().enumerate() {
                    let value = if i < read { scratch[i] } else { 0.0 };
                    *sample = T::from_sample(value);
                }

                if read < data.len() && shared.armed.load(Ordering::Acquire) {
                    shared.xrun.store(true, Ordering::Release);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| Error::DeviceCommit(format!("Failed to build stream: {e}")))
}
