//! # Audio Capture Module
//!
//! This module handles real-time audio capture using CPAL (Cross-Platform Audio Library).
//! It implements the [`capture`](crate::capture) traits on top of a cpal input
//! stream, so a session can listen to a real microphone.
//!
//! ## Features
//! - Default or named input device selection
//! - f32 configuration closest to the requested rate, mono preferred
//! - Streams start paused and only play once the session resumes them
//! - Interleaved input is downmixed to mono on the audio thread

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SupportedStreamConfigRange;
use crossbeam_channel::{Receiver, TrySendError, bounded};
use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::capture::{
    AudioInputProvider, CaptureNode, CaptureOptions, InputConstraints, PendingStream,
    SampleHistory,
};

/// Number of callback chunks buffered between the audio thread and the node.
///
/// At a few hundred samples per callback this is well over a second of audio,
/// far more than one tick ever needs.
pub const CHUNK_QUEUE_LEN: usize = 64;

/// Opens cpal input streams for a session.
#[derive(Debug, Clone, Default)]
pub struct CpalInputProvider {
    device_name: Option<String>,
}

impl CpalInputProvider {
    /// Provider for the host's default input device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider for the input device with exactly this name.
    pub fn with_device(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
        }
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    fn open(
        &self,
        constraints: &InputConstraints,
        options: &CaptureOptions,
    ) -> Result<Box<dyn CaptureNode>> {
        if constraints.requests_processing() {
            // cpal exposes no processing stages, the stream is raw either way.
            warn!("Input processing requested but not available; capturing raw audio");
        }

        let host = cpal::default_host();
        let device = match &self.device_name {
            Some(name) => find_input_device(&host, name)?,
            None => host
                .default_input_device()
                .ok_or_else(|| anyhow!("No input device available"))?,
        };
        let device_name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
        info!("Using audio input device: {device_name}");

        let configs = device
            .supported_input_configs()
            .with_context(|| format!("Cannot query input formats of '{device_name}'"))?
            .collect::<Vec<_>>();
        let supported_config = find_supported_config(configs, constraints.sample_rate)
            .ok_or_else(|| anyhow!("No suitable f32 input format found on '{device_name}'"))?;

        let sample_rate = closest_rate(&supported_config, constraints.sample_rate);
        let channels = supported_config.channels().max(1) as usize;
        let config: cpal::StreamConfig = supported_config
            .with_sample_rate(cpal::SampleRate(sample_rate))
            .into();
        info!("Selected sample rate: {sample_rate} Hz, {channels} channel(s)");

        let (sender, chunks) = bounded::<Vec<f32>>(CHUNK_QUEUE_LEN);
        let dropped = Arc::new(AtomicU64::new(0));
        let dropped_in_callback = Arc::clone(&dropped);

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let chunk = downmix(data, channels);
                    if let Err(TrySendError::Full(_)) = sender.try_send(chunk) {
                        dropped_in_callback.fetch_add(1, Ordering::Relaxed);
                    }
                },
                |err| warn!("An error occurred on the audio stream: {err}"),
                None,
            )
            .with_context(|| format!("Cannot open input stream on '{device_name}'"))?;

        Ok(Box::new(CpalCaptureNode {
            stream,
            sample_rate,
            playing: false,
            chunks,
            history: SampleHistory::new(options.window_size, options.smoothing),
            dropped,
            reported_drops: 0,
        }))
    }
}

impl AudioInputProvider for CpalInputProvider {
    fn request_input_stream(
        &mut self,
        constraints: &InputConstraints,
        options: &CaptureOptions,
    ) -> PendingStream {
        // cpal opens devices synchronously; the request is resolved on return.
        PendingStream::ready(self.open(constraints, options))
    }
}

/// A cpal input stream feeding a rolling sample history.
pub struct CpalCaptureNode {
    stream: cpal::Stream,
    sample_rate: u32,
    playing: bool,
    chunks: Receiver<Vec<f32>>,
    history: SampleHistory,
    dropped: Arc<AtomicU64>,
    reported_drops: u64,
}

impl CpalCaptureNode {
    fn drain_chunks(&mut self) {
        for chunk in self.chunks.try_iter() {
            self.history.push(&chunk);
        }

        let dropped = self.dropped.load(Ordering::Relaxed);
        if dropped > self.reported_drops {
            warn!(
                "Dropped {} audio chunk(s) while the session was busy",
                dropped - self.reported_drops
            );
            self.reported_drops = dropped;
        }
    }
}

impl CaptureNode for CpalCaptureNode {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_suspended(&self) -> bool {
        !self.playing
    }

    fn resume(&mut self) -> Result<()> {
        self.stream.play().context("Cannot start the audio stream")?;
        self.playing = true;
        Ok(())
    }

    fn copy_latest_samples(&mut self, buffer: &mut [f32]) -> usize {
        self.drain_chunks();
        self.history.copy_latest(buffer)
    }
}

impl Drop for CpalCaptureNode {
    fn drop(&mut self) {
        if self.playing {
            if let Err(err) = self.stream.pause() {
                debug!("Pausing the audio stream failed: {err}");
            }
        }
        debug!("Audio input stream released");
    }
}

/// Names of all input devices of the default host.
pub fn input_device_names() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let names = host
        .input_devices()
        .context("Cannot enumerate input devices")?
        .filter_map(|device| device.name().ok())
        .collect();
    Ok(names)
}

/// Name of the default input device, if there is one.
pub fn default_input_device_name() -> Option<String> {
    cpal::default_host()
        .default_input_device()
        .and_then(|device| device.name().ok())
}

fn find_input_device(host: &cpal::Host, name: &str) -> Result<cpal::Device> {
    host.input_devices()
        .context("Cannot enumerate input devices")?
        .find(|device| device.name().map(|n| n == name).unwrap_or(false))
        .ok_or_else(|| anyhow!("Input device '{name}' not found"))
}

/// Finds the best supported audio configuration for the target sample rate.
///
/// Only 32-bit float formats qualify. Among those, mono beats multi-channel,
/// then the range closest to `target_rate` wins.
///
/// # Arguments
/// * `configs` - List of supported audio configurations from the device
/// * `target_rate` - Desired sample rate in Hz
///
/// # Returns
/// * `Some(config)` - Best matching configuration
/// * `None` - No suitable configuration found
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| (c.channels() != 1, rate_distance(c, target_rate)))
}

/// Distance from `target_rate` to the config's supported range, 0 inside it.
fn rate_distance(config: &SupportedStreamConfigRange, target_rate: u32) -> u32 {
    target_rate.abs_diff(closest_rate(config, target_rate))
}

fn closest_rate(config: &SupportedStreamConfigRange, target_rate: u32) -> u32 {
    target_rate.clamp(config.min_sample_rate().0, config.max_sample_rate().0)
}

/// Averages interleaved frames into mono samples.
fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    let scale = 1.0 / channels as f32;
    data.chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}
