//! # Capture Module
//!
//! The session's view of its audio environment: a provider that hands out
//! live input streams, and the capture node each stream is read through.
//! Backends implement these traits (see [`crate::audio`] for cpal); tests
//! substitute fakes.
//!
//! A capture node owns its device. Dropping the node releases it.

use crossbeam_channel::{bounded, Receiver, SendError, Sender, TryRecvError};
use log::{debug, warn};
use serde::Serialize;
use std::collections::VecDeque;

use crate::config::SessionConfig;

/// Processing the input device must leave off. Echo cancellation, noise
/// suppression and automatic gain control all reshape the waveform the
/// autocorrelation depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InputConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    /// Preferred capture rate in Hz. Devices may deliver another.
    pub sample_rate: u32,
}

impl InputConstraints {
    /// Unprocessed input at the given rate.
    pub fn raw(sample_rate: u32) -> Self {
        Self {
            echo_cancellation: false,
            noise_suppression: false,
            auto_gain_control: false,
            sample_rate,
        }
    }

    pub fn requests_processing(&self) -> bool {
        self.echo_cancellation || self.noise_suppression || self.auto_gain_control
    }
}

/// How the capture node buffers samples for the session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureOptions {
    /// Number of most recent samples kept for `copy_latest_samples`.
    pub window_size: usize,
    /// One-pole smoothing between consecutive copies, 0 for raw samples.
    pub smoothing: f32,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for CaptureOptions {
    fn from(config: &SessionConfig) -> Self {
        Self {
            window_size: config.window_size,
            smoothing: config.smoothing as f32,
        }
    }
}

/// A live, mono, continuously filling sample source.
pub trait CaptureNode {
    /// Rate the samples are actually delivered at, in Hz.
    fn sample_rate(&self) -> u32;

    /// Some backends hand out streams that do not run until resumed.
    fn is_suspended(&self) -> bool;

    fn resume(&mut self) -> anyhow::Result<()>;

    /// Fills `buffer` with the most recent samples, newest last, and returns
    /// how many of them are real. When fewer are available the front of the
    /// buffer is zero-filled.
    fn copy_latest_samples(&mut self, buffer: &mut [f32]) -> usize;
}

pub type StreamResult = anyhow::Result<Box<dyn CaptureNode>>;

/// Source of input streams.
pub trait AudioInputProvider {
    /// Starts acquiring an input stream. The request may resolve right away
    /// or later, from the provider's side of the returned channel.
    fn request_input_stream(
        &mut self,
        constraints: &InputConstraints,
        options: &CaptureOptions,
    ) -> PendingStream;
}

/// State of a pending acquisition when polled.
pub enum Resolution {
    Pending,
    Ready(StreamResult),
    /// The provider dropped the request without answering.
    Abandoned,
}

/// The session's half of an acquisition in flight.
///
/// Dropping it cancels the request. A stream that was already delivered but
/// not yet picked up is released on drop.
pub struct PendingStream {
    receiver: Receiver<StreamResult>,
    // Never sent on; the request sees it disconnect when this side is gone.
    _cancel: Sender<()>,
}

/// The provider's half of an acquisition in flight.
pub struct StreamRequest {
    sender: Sender<StreamResult>,
    cancelled: Receiver<()>,
}

impl PendingStream {
    /// A request that the provider resolves later through [`StreamRequest`].
    pub fn channel() -> (StreamRequest, PendingStream) {
        let (sender, receiver) = bounded(1);
        let (cancel, cancelled) = bounded(0);
        (
            StreamRequest { sender, cancelled },
            PendingStream {
                receiver,
                _cancel: cancel,
            },
        )
    }

    /// A request that is already resolved.
    pub fn ready(result: StreamResult) -> Self {
        let (request, pending) = Self::channel();
        request.resolve(result);
        pending
    }

    pub fn try_resolve(&self) -> Resolution {
        match self.receiver.try_recv() {
            Ok(result) => Resolution::Ready(result),
            Err(TryRecvError::Empty) => Resolution::Pending,
            Err(TryRecvError::Disconnected) => Resolution::Abandoned,
        }
    }
}

impl Drop for PendingStream {
    fn drop(&mut self) {
        if let Ok(Ok(_node)) = self.receiver.try_recv() {
            debug!("Releasing input stream delivered to a cancelled request");
        }
    }
}

impl StreamRequest {
    /// Delivers the outcome of the acquisition.
    ///
    /// Returns `false` when the request was cancelled in the meantime; a
    /// stream acquired for it is released here instead of being handed over.
    pub fn resolve(self, result: StreamResult) -> bool {
        match self.sender.send(result) {
            Ok(()) => true,
            Err(SendError(Ok(node))) => {
                warn!("Input stream acquired after the request was cancelled; releasing it");
                drop(node);
                false
            }
            Err(SendError(Err(err))) => {
                debug!("Acquisition failed after the request was cancelled: {err:#}");
                false
            }
        }
    }

    /// Whether the session still waits for this request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.cancelled.try_recv(), Err(TryRecvError::Disconnected))
    }
}

/// Rolling buffer of the most recent samples.
///
/// The backend pushes whatever chunk sizes the device produces; the session
/// copies fixed-size windows out of it.
#[derive(Debug, Clone)]
pub struct SampleHistory {
    samples: VecDeque<f32>,
    capacity: usize,
    smoothing: f32,
    previous: Vec<f32>,
}

impl SampleHistory {
    pub fn new(capacity: usize, smoothing: f32) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            smoothing: smoothing.clamp(0.0, 0.999),
            previous: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.capacity
    }

    pub fn push(&mut self, chunk: &[f32]) {
        if chunk.len() >= self.capacity {
            self.samples.clear();
            self.samples
                .extend(&chunk[chunk.len() - self.capacity..]);
            return;
        }

        let overflow = (self.samples.len() + chunk.len()).saturating_sub(self.capacity);
        self.samples.drain(..overflow);
        self.samples.extend(chunk);
    }

    /// See [`CaptureNode::copy_latest_samples`]. With smoothing enabled each
    /// copy is blended with the previous one of the same length.
    pub fn copy_latest(&mut self, buffer: &mut [f32]) -> usize {
        let available = buffer.len().min(self.samples.len());
        let offset = buffer.len() - available;
        let start = self.samples.len() - available;

        buffer[..offset].fill(0.0);
        for (dst, src) in buffer[offset..].iter_mut().zip(self.samples.range(start..)) {
            *dst = *src;
        }

        if self.smoothing > 0.0 {
            if self.previous.len() == buffer.len() {
                let s = self.smoothing;
                for (current, previous) in buffer.iter_mut().zip(&self.previous) {
                    *current = s * previous + (1.0 - s) * *current;
                }
            }
            self.previous.clear();
            self.previous.extend_from_slice(buffer);
        }

        available
    }
}
