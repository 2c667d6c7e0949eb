//! Sensor subsystem: flow meter pulse counting and the water quality probe.
//!
//! Digital inputs (level floats, selector, hard-fault line) need no
//! processing beyond polarity and are read straight by the GPIO adapter.

pub mod counters;
pub mod quality;

pub use counters::{CounterBaseline, PulseCounters, PulseSample};
pub use quality::{QualityProbe, QualityReading, ppm_to_raw, raw_to_ppm};
