//! Subcommand implementations.

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::unbounded;
use serde::Serialize;
use sounddeck_core::{
    AudioOutputSettings, DeviceAttributes, DisplayModeInfo, OutputConfig, SampleType,
    DISPLAY_MODES,
};
use sounddeck_output::{
    discover, CpalBackend, FrameHandle, PcmBackend, PlaybackOutput, SoundOutput,
};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::cli::PlayArgs;
use crate::pattern::{BarsFrame, SineTone};

/// Frames kept queued ahead of the clock.
const PREROLL_FRAMES: u32 = 5;

/// Audio written per loop iteration.
const AUDIO_CHUNK: Duration = Duration::from_millis(10);

#[derive(Serialize)]
struct DeviceSummary {
    name: String,
    external: bool,
    attributes: DeviceAttributes,
}

pub fn devices(config: &OutputConfig, json: bool) -> Result<()> {
    let backend: Arc<dyn PcmBackend> = Arc::new(CpalBackend::new(config));
    let devices = discover(&backend, None).context("Failed to enumerate sound devices")?;

    let summaries: Vec<DeviceSummary> = devices
        .iter()
        .map(|device| DeviceSummary {
            name: device.display_name(),
            external: device.is_external(),
            attributes: device.attributes(),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if summaries.is_empty() {
        println!("No playback devices found");
    }
    for summary in &summaries {
        println!(
            "{}  ({} audio channels{})",
            summary.name,
            summary.attributes.maximum_audio_channels,
            if summary.external { ", driver" } else { "" }
        );
    }
    Ok(())
}

pub fn modes() {
    println!("{:<12} {:>11} {:>12}  scan", "name", "size", "rate");
    for info in &DISPLAY_MODES {
        println!(
            "{:<12} {:>11} {:>12}  {:?}",
            info.name(),
            format!("{}x{}", info.width, info.height),
            info.frame_rate.to_string(),
            info.field_dominance
        );
    }
}

/// Outcome of a `play` session.
#[derive(Debug, Default)]
pub struct PlayReport {
    pub frames_scheduled: u64,
    pub frames_completed: u64,
    pub audio_frames_written: u64,
    /// Writes that took fewer frames than offered.
    pub short_writes: u64,
}

impl fmt::Display for PlayReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} frames completed, {} audio frames written, {} short writes",
            self.frames_completed,
            self.frames_scheduled,
            self.audio_frames_written,
            self.short_writes
        )
    }
}

pub fn play(config: OutputConfig, args: &PlayArgs) -> Result<PlayReport> {
    let mode = DisplayModeInfo::by_name(&args.mode)
        .ok_or_else(|| anyhow!("Unknown display mode {}", args.mode))?;
    let sample_type = SampleType::try_from(args.bits)?;
    let config = match &args.device {
        Some(device) => OutputConfig {
            device: device.clone(),
            ..config
        },
        None => config,
    };

    let output = SoundOutput::new(config);
    let (completed_tx, completed_rx) = unbounded::<FrameHandle>();
    output.set_scheduled_frame_completion_callback(Some(Arc::new(move |frame: FrameHandle| {
        let _ = completed_tx.send(frame);
    })))?;

    let rate = output.enable_video_output(mode.mode)?;
    let format = output
        .enable_audio_output(&AudioOutputSettings::new(48000, sample_type, args.channels))
        .context("Failed to enable audio output")?;
    info!(
        "Playing {} with {} Hz audio on {} of {} channels",
        mode.name(),
        format.sample_rate,
        format.physical_channels,
        format.requested_channels
    );

    let frame: FrameHandle = Arc::new(BarsFrame::new(mode.width, mode.height));
    let mut report = PlayReport::default();
    let schedule = |report: &mut PlayReport| -> Result<()> {
        let display_time = i64::try_from(report.frames_scheduled)? * rate.duration();
        output.schedule_video_frame(&frame, display_time, rate.duration(), rate.scale())?;
        report.frames_scheduled += 1;
        Ok(())
    };
    for _ in 0..PREROLL_FRAMES {
        schedule(&mut report)?;
    }
    output.start_scheduled_playback(0, rate.scale(), 1.0)?;

    let chunk_frames = (u128::from(format.sample_rate) * AUDIO_CHUNK.as_millis() / 1000) as u32;
    let mut tone = SineTone::new(args.frequency, format.sample_rate);
    let mut buffer = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(args.seconds);

    while Instant::now() < deadline {
        report.frames_completed += completed_rx.try_iter().count() as u64;
        while output.buffered_video_frame_count()? < PREROLL_FRAMES {
            schedule(&mut report)?;
        }

        tone.fill(
            &mut buffer,
            chunk_frames as usize,
            format.requested_channels as usize,
            format.sample_type,
        );
        let written = output.write_audio_samples_sync(&buffer, chunk_frames)?;
        report.audio_frames_written += u64::from(written);
        if written < chunk_frames {
            report.short_writes += 1;
        }
    }

    output.stop_scheduled_playback(0, rate.scale())?;
    if let Err(e) = output.disable_audio_output() {
        warn!("Failed to disable audio output: {e}");
    }
    output.disable_video_output()?;
    report.frames_completed += completed_rx.try_iter().count() as u64;
    Ok(report)
}
