//! # Session Module
//!
//! The listening session: acquires an input stream, samples it once per tick,
//! runs the pitch estimator and publishes what it hears.
//!
//! ```text
//!             start                stream ready
//!   Idle ─────────────▶ Acquiring ──────────────▶ Listening
//!                         ▲    │
//!                   start │    │ denied, abandoned, unusable device
//!                         │    ▼
//!                         Error
//!
//!   stop: Acquiring, Listening, Error ─▶ Idle
//! ```
//!
//! Every resource belongs to the phase it was acquired in, and every exit
//! from a phase goes through [`Session::release`]. Each tick publishes a
//! snapshot, an Acquiring one while the stream is still on its way. A tick
//! that is not the session's pending tick is ignored, so nothing is
//! published after a stop.

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, trace, warn};
use serde::Serialize;
use std::fmt;
use std::mem;

use anyhow::{Context, anyhow};

use crate::PitchReading;
use crate::capture::{
    AudioInputProvider, CaptureNode, CaptureOptions, InputConstraints, PendingStream, Resolution,
};
use crate::config::SessionConfig;
use crate::error::ConfigError;
use crate::pitch::{PitchEstimator, SampleWindow};
use crate::scheduler::{FrameClock, Scheduler, TickId};

/// Externally visible lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Acquiring,
    Listening,
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Idle => "idle",
            SessionState::Acquiring => "acquiring",
            SessionState::Listening => "listening",
            SessionState::Error => "error",
        })
    }
}

/// What observers receive on every tick and state transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// Increases by one with every publish.
    pub sequence: u64,
    pub state: SessionState,
    pub reading: PitchReading,
    pub error: Option<String>,
}

/// A live input stream and the estimator sized for it.
struct Capture {
    node: Box<dyn CaptureNode>,
    estimator: PitchEstimator,
    buffer: Vec<f32>,
}

impl Capture {
    /// Estimates the pitch of the latest window. A window that is not yet
    /// full counts as silence.
    fn read(&mut self) -> PitchReading {
        let filled = self.node.copy_latest_samples(&mut self.buffer);
        if filled < self.buffer.len() {
            return PitchReading::silent();
        }
        let window = SampleWindow::new(&self.buffer, self.node.sample_rate());
        self.estimator
            .estimate(&window)
            .map(PitchReading::detected)
            .unwrap_or_else(PitchReading::silent)
    }
}

enum Phase {
    Idle,
    Acquiring(PendingStream),
    Listening(Capture),
    Error(String),
}

/// Drives pitch detection over a live input stream.
///
/// The session is single-threaded: the caller forwards fired ticks from the
/// scheduler to [`on_tick`](Self::on_tick) and all processing happens inside
/// that call.
pub struct Session<P: AudioInputProvider, S: Scheduler> {
    config: SessionConfig,
    provider: P,
    scheduler: S,
    phase: Phase,
    reading: PitchReading,
    pending_tick: Option<TickId>,
    sequence: u64,
    observers: Vec<Sender<SessionSnapshot>>,
}

impl<P: AudioInputProvider, S: Scheduler> Session<P, S> {
    /// Creates an idle session.
    ///
    /// # Returns
    /// * `Ok(session)` - The configuration is usable at its requested rate
    /// * `Err(e)` - The configuration is rejected before any device is touched
    pub fn new(config: SessionConfig, provider: P, scheduler: S) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            provider,
            scheduler,
            phase: Phase::Idle,
            reading: PitchReading::silent(),
            pending_tick: None,
            sequence: 0,
            observers: Vec::new(),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        match self.phase {
            Phase::Idle => SessionState::Idle,
            Phase::Acquiring(_) => SessionState::Acquiring,
            Phase::Listening(_) => SessionState::Listening,
            Phase::Error(_) => SessionState::Error,
        }
    }

    /// The latest reading. Silent outside of Listening.
    pub fn reading(&self) -> &PitchReading {
        &self.reading
    }

    /// The failure that put the session into the Error state.
    pub fn error(&self) -> Option<&str> {
        match &self.phase {
            Phase::Error(message) => Some(message),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            sequence: self.sequence,
            state: self.state(),
            reading: self.reading.clone(),
            error: self.error().map(str::to_owned),
        }
    }

    /// Receives a snapshot for every publish from now on. Dropping the
    /// receiver unsubscribes.
    pub fn subscribe(&mut self) -> Receiver<SessionSnapshot> {
        let (sender, receiver) = unbounded();
        self.observers.push(sender);
        receiver
    }

    /// The tick this session waits for, if any.
    pub fn pending_tick(&self) -> Option<TickId> {
        self.pending_tick
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    /// Requests an input stream and starts listening once it arrives.
    ///
    /// Does nothing while already acquiring or listening. From Error the
    /// old message is discarded and acquisition is retried.
    pub fn start_listening(&mut self) {
        if matches!(self.phase, Phase::Acquiring(_) | Phase::Listening(_)) {
            trace!("start_listening ignored in state {}", self.state());
            return;
        }

        let constraints = InputConstraints::raw(self.config.sample_rate);
        let options = CaptureOptions::from(&self.config);
        let pending = self.provider.request_input_stream(&constraints, &options);

        debug!("Session {} -> acquiring", self.state());
        self.phase = Phase::Acquiring(pending);
        self.reading = PitchReading::silent();
        self.publish();

        // Synchronous providers have already answered.
        self.poll_acquisition();
        self.schedule_next();
    }

    /// Releases the input stream (or abandons the pending request) and goes
    /// back to Idle. Does nothing when already idle.
    pub fn stop_listening(&mut self) {
        if matches!(self.phase, Phase::Idle) {
            return;
        }
        debug!("Session {} -> idle", self.state());
        self.release();
        self.reading = PitchReading::silent();
        self.publish();
    }

    /// Handles a fired tick.
    ///
    /// While acquiring, checks whether the stream has arrived and publishes
    /// the outcome, or another Acquiring snapshot if it has not. While
    /// listening, estimates the pitch of the latest window and publishes the
    /// reading. Ticks other than the pending one are ignored.
    pub fn on_tick(&mut self, id: TickId) {
        if self.pending_tick != Some(id) {
            trace!("Ignoring stale tick {id:?}");
            return;
        }
        self.pending_tick = None;

        if let Phase::Listening(capture) = &mut self.phase {
            self.reading = capture.read();
            self.publish();
        } else {
            self.poll_acquisition();
            if matches!(self.phase, Phase::Acquiring(_)) {
                self.publish();
            }
        }
        self.schedule_next();
    }

    fn poll_acquisition(&mut self) {
        let resolution = match &self.phase {
            Phase::Acquiring(pending) => pending.try_resolve(),
            _ => return,
        };

        match resolution {
            Resolution::Pending => {}
            Resolution::Ready(Ok(node)) => self.enter_listening(node),
            Resolution::Ready(Err(err)) => self.fail(format!("{err:#}")),
            Resolution::Abandoned => {
                self.fail("Audio input request was abandoned by the provider".to_string())
            }
        }
    }

    fn enter_listening(&mut self, node: Box<dyn CaptureNode>) {
        let window_size = self.config.window_size;
        let estimator = PitchEstimator::new(window_size, self.config.estimator.clone());
        // Owned by the Listening phase from here on, so a failure below
        // releases it through the same path as a stop.
        self.phase = Phase::Listening(Capture {
            node,
            estimator,
            buffer: vec![0.0; window_size],
        });

        if let Err(err) = self.activate() {
            self.fail(format!("{err:#}"));
            return;
        }
        debug!("Session acquiring -> listening");
        self.publish();
    }

    /// Checks the delivered rate and resumes a suspended stream.
    fn activate(&mut self) -> anyhow::Result<()> {
        let Phase::Listening(capture) = &mut self.phase else {
            return Err(anyhow!("No input stream to activate"));
        };

        let sample_rate = capture.node.sample_rate();
        self.config
            .validate_for_rate(sample_rate)
            .with_context(|| format!("Input device delivers {sample_rate} Hz"))?;

        if capture.node.is_suspended() {
            debug!("Resuming suspended input stream");
            capture.node.resume()?;
        }
        Ok(())
    }

    fn fail(&mut self, message: String) {
        warn!("Audio input failed: {message}");
        self.release();
        self.phase = Phase::Error(message);
        self.reading = PitchReading::silent();
        self.publish();
    }

    fn schedule_next(&mut self) {
        if self.pending_tick.is_none()
            && matches!(self.phase, Phase::Acquiring(_) | Phase::Listening(_))
        {
            self.pending_tick = Some(self.scheduler.schedule_tick());
        }
    }

    /// The single exit path for every phase: cancels the pending tick and
    /// drops whatever the current phase holds, leaving the session idle.
    fn release(&mut self) {
        if let Some(id) = self.pending_tick.take() {
            self.scheduler.cancel_tick(id);
        }
        match mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Acquiring(pending) => {
                debug!("Abandoning pending input request");
                drop(pending);
            }
            Phase::Listening(capture) => {
                debug!("Releasing input stream");
                drop(capture);
            }
            Phase::Idle | Phase::Error(_) => {}
        }
    }

    fn publish(&mut self) {
        self.sequence += 1;
        let snapshot = self.snapshot();
        self.observers
            .retain(|observer| observer.send(snapshot.clone()).is_ok());
    }
}

impl<P: AudioInputProvider> Session<P, FrameClock> {
    /// Runs the session on its frame clock until `shutdown` fires or the
    /// session stops scheduling ticks (it failed, or was never started),
    /// then stops it.
    pub fn run_until<T>(&mut self, shutdown: &Receiver<T>) {
        while let Some(id) = self.scheduler.wait(shutdown) {
            self.on_tick(id);
        }
        if matches!(self.phase, Phase::Acquiring(_) | Phase::Listening(_)) {
            self.stop_listening();
        }
    }
}

impl<P: AudioInputProvider, S: Scheduler> Drop for Session<P, S> {
    fn drop(&mut self) {
        self.release();
    }
}
