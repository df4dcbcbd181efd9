//! Tick counter and clock sources.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Supplies monotonic wall time in milliseconds.
pub trait Clock {
    fn now_ms(&self) -> f64;
}

/// Milliseconds elapsed since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// A clock advanced by hand, for tests and replays.
///
/// Clones share the same reading, so a test can keep a handle while the
/// driver owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, now_ms: f64) {
        self.now.set(now_ms);
    }

    pub fn advance(&self, ms: f64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }
}

/// Simulation time as seen by systems.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Time {
    /// Ticks completed so far; the tick in progress has this number.
    pub tick: u64,
    /// Seconds between the previous step and the current one.
    pub delta: f64,
    /// Clock reading at the previous step, in milliseconds.
    pub previous_ms: f64,
}

impl Time {
    /// Record a new clock reading, computing the delta from the last one.
    pub fn advance_to(&mut self, now_ms: f64) {
        self.delta = (now_ms - self.previous_ms) / 1000.0;
        self.previous_ms = now_ms;
    }

    /// Set the baseline without producing a delta.
    pub fn reset(&mut self, now_ms: f64) {
        self.previous_ms = now_ms;
        self.delta = 0.0;
    }
}
