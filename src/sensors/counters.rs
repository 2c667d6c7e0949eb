//! Hall-effect flow meter pulse counters.
//!
//! Each meter raises one interrupt per pulse.  The ISR side only ever
//! increments; the control cycle only ever loads.  Run-relative counts are
//! derived in the core by subtracting a baseline, so a "reset" never races
//! with an in-flight increment and no pulse is lost.
//!
//! Counters are owned values (share them with `Arc`), not statics, so a
//! test or a second instance never sees someone else's pulses.

use core::sync::atomic::{AtomicU32, Ordering};

/// A pair of monotonically increasing (wrapping) pulse counters.
#[derive(Debug, Default)]
pub struct PulseCounters {
    inlet: AtomicU32,
    product: AtomicU32,
}

/// Raw counter values captured in one load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PulseSample {
    pub inlet: u32,
    pub product: u32,
}

impl PulseCounters {
    pub const fn new() -> Self {
        Self {
            inlet: AtomicU32::new(0),
            product: AtomicU32::new(0),
        }
    }

    /// Called from the inlet meter ISR on each edge.
    pub fn record_inlet_pulse(&self) {
        self.inlet.fetch_add(1, Ordering::Relaxed);
    }

    /// Called from the product meter ISR on each edge.
    pub fn record_product_pulse(&self) {
        self.product.fetch_add(1, Ordering::Relaxed);
    }

    /// Bulk increment, used by simulated plants.
    pub fn add(&self, inlet: u32, product: u32) {
        self.inlet.fetch_add(inlet, Ordering::Relaxed);
        self.product.fetch_add(product, Ordering::Relaxed);
    }

    /// Load both counters.
    pub fn sample(&self) -> PulseSample {
        PulseSample {
            inlet: self.inlet.load(Ordering::Acquire),
            product: self.product.load(Ordering::Acquire),
        }
    }
}

/// Baseline for run-relative counts.
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterBaseline {
    base: PulseSample,
}

impl CounterBaseline {
    /// Move the baseline to `raw`; subsequent relative counts start at zero.
    pub fn rebase(&mut self, raw: PulseSample) {
        self.base = raw;
    }

    /// Pulses since the last rebase.  Wrapping subtraction keeps this
    /// correct across a `u32` roll-over of the raw counter.
    pub fn relative(&self, raw: PulseSample) -> PulseSample {
        PulseSample {
            inlet: raw.inlet.wrapping_sub(self.base.inlet),
            product: raw.product.wrapping_sub(self.base.product),
        }
    }
}
