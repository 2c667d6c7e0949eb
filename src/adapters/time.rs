//! Clock adapters.
//!
//! - [`SystemClock`]: `std::time::Instant` for the monotonic base and
//!   `SystemTime` for table timestamps.
//! - [`ManualClock`]: stepped by hand; drives the simulator in fast mode
//!   and every timing test.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::app::ports::ClockPort;

/// Host clock.
pub struct SystemClock {
    start: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl ClockPort for SystemClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// `0` if the system clock reads before the Unix epoch.
    fn wall_clock_secs(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs() as i64)
    }
}

/// Hand-stepped clock.  Wall-clock time advances together with the
/// monotonic time from the base given at construction.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
    wall_base_secs: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(start_ms),
            wall_base_secs: AtomicI64::new(0),
        }
    }

    /// Same, with wall-clock time starting at `wall_secs`.
    pub fn with_wall_clock(start_ms: u64, wall_secs: i64) -> Self {
        Self {
            now_ms: AtomicU64::new(start_ms),
            wall_base_secs: AtomicI64::new(wall_secs - (start_ms / 1000) as i64),
        }
    }

    pub fn advance_ms(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::Relaxed);
    }

    pub fn set_ms(&self, ms: u64) {
        self.now_ms.store(ms, Ordering::Relaxed);
    }
}

impl ClockPort for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::Relaxed)
    }

    fn wall_clock_secs(&self) -> i64 {
        self.wall_base_secs.load(Ordering::Relaxed) + (self.now_ms() / 1000) as i64
    }
}
