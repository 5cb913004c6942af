//! # Scheduler Module
//!
//! Tick sources for the listening loop. A session asks for one tick at a time
//! and cancels it on stop; whoever drives the session hands fired tick ids back
//! through [`Session::on_tick`](crate::session::Session::on_tick).

use crossbeam_channel::{Receiver, at, never, select};
use std::time::{Duration, Instant};

/// One display frame at 60 Hz.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Identifies one scheduled tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TickId(pub u64);

pub trait Scheduler {
    /// Schedules a tick and returns its id.
    fn schedule_tick(&mut self) -> TickId;

    /// Cancels a tick. Unknown or already fired ids are ignored.
    fn cancel_tick(&mut self, id: TickId);
}

/// Fixed-interval scheduler with at most one tick outstanding.
#[derive(Debug)]
pub struct FrameClock {
    interval: Duration,
    next_id: u64,
    pending: Option<(TickId, Instant)>,
}

impl FrameClock {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_id: 0,
            pending: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// The outstanding tick, if any.
    pub fn pending(&self) -> Option<TickId> {
        self.pending.map(|(id, _)| id)
    }

    /// Blocks until the outstanding tick is due, then fires it.
    ///
    /// # Returns
    /// * `Some(id)` - The tick that fired
    /// * `None` - `shutdown` received a message or disconnected, or no tick
    ///   is scheduled
    pub fn wait<T>(&mut self, shutdown: &Receiver<T>) -> Option<TickId> {
        let (id, due) = self.pending?;
        let timer = at(due);
        select! {
            recv(shutdown) -> _ => None,
            recv(timer) -> _ => {
                self.pending = None;
                Some(id)
            }
        }
    }

    /// Like [`wait`](Self::wait) without a shutdown signal.
    pub fn wait_for_tick(&mut self) -> Option<TickId> {
        self.wait(&never::<()>())
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(FRAME_INTERVAL)
    }
}

impl Scheduler for FrameClock {
    fn schedule_tick(&mut self) -> TickId {
        self.next_id += 1;
        let id = TickId(self.next_id);
        self.pending = Some((id, Instant::now() + self.interval));
        id
    }

    fn cancel_tick(&mut self, id: TickId) {
        if self.pending() == Some(id) {
            self.pending = None;
        }
    }
}
