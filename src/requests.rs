//! Operator start/stop requests.
//!
//! Producers (a web handler, a button task, the CLI) may run on any
//! thread; the control cycle is the only consumer.  Each request is a
//! single atomic flag that is set by the producer and taken with `swap`
//! by the consumer, so a request is handled exactly once and a second
//! request raised before the cycle runs collapses into the first.

use core::sync::atomic::{AtomicBool, Ordering};

/// Pending operator requests.  Share with `Arc`.
#[derive(Debug, Default)]
pub struct ControlRequests {
    start: AtomicBool,
    stop: AtomicBool,
}

/// Requests taken by one control cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingRequests {
    pub start: bool,
    pub stop: bool,
}

impl ControlRequests {
    pub const fn new() -> Self {
        Self {
            start: AtomicBool::new(false),
            stop: AtomicBool::new(false),
        }
    }

    /// Ask the controller to start a run.
    pub fn request_start(&self) {
        self.start.store(true, Ordering::Release);
    }

    /// Ask the controller to stop whatever it is doing.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Consume both flags.  Called once per control cycle.
    pub fn take(&self) -> PendingRequests {
        PendingRequests {
            stop: self.stop.swap(false, Ordering::AcqRel),
            start: self.start.swap(false, Ordering::AcqRel),
        }
    }
}
