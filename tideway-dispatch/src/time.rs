//! Time abstraction.
//!
//! The dispatch layer needs wall-clock time in two places: stamping the
//! caller instance timestamp onto requests, and arming wait-for-death-info
//! deadlines. Both go through [`TimeSource`] so tests can drive time by
//! hand instead of sleeping.

use std::cell::Cell;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock time, in milliseconds since the Unix epoch.
pub trait TimeSource {
    /// Current time in milliseconds.
    fn now_ms(&self) -> i64;
}

/// Production time source backed by the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => elapsed.as_millis() as i64,
            // Clock before the epoch; report it as negative offset.
            Err(e) => -(e.duration().as_millis() as i64),
        }
    }
}

/// Hand-driven time source for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    now_ms: Cell<i64>,
}

impl ManualTimeSource {
    /// Create a manual clock starting at the given instant.
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: Cell::new(start_ms),
        }
    }

    /// Advance the clock.
    pub fn advance(&self, delta_ms: i64) {
        self.now_ms.set(self.now_ms.get() + delta_ms);
    }

    /// Set the clock to an absolute instant.
    pub fn set(&self, now_ms: i64) {
        self.now_ms.set(now_ms);
    }
}

impl TimeSource for ManualTimeSource {
    fn now_ms(&self) -> i64 {
        self.now_ms.get()
    }
}
