//! Time sources for the apply breaker.
//!
//! `ManualClock` provides controllable virtual time for tests. Time only
//! advances when explicitly requested via `advance_by()`, which keeps breaker
//! windows deterministic without real waiting.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

pub trait Clock {
    /// Milliseconds since the clock's origin.
    fn now_ms(&self) -> u64;
}

/// Wall-clock time measured from creation.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Virtual time clock. Clones share the same timeline.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    current_time_ms: Rc<Cell<u64>>,
}

impl ManualClock {
    /// Create a new clock starting at time 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance virtual time by the specified milliseconds.
    pub fn advance_by(&self, ms: u64) {
        self.current_time_ms.set(self.current_time_ms.get() + ms);
    }

    pub fn set_ms(&self, ms: u64) {
        self.current_time_ms.set(ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.current_time_ms.get()
    }
}
