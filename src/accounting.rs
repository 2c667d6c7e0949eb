//! Flow and production accounting.
//!
//! Converts run-relative pulse counts into litres, tracks the volume
//! produced since `Production` was entered, checks mode limits and
//! estimates the product flow rate.  Everything here is pure arithmetic
//! over values the control cycle passes in.

use crate::config::{ProductionMode, Settings};

/// Litres for a pulse count at the given calibration.
/// A non-positive calibration yields zero rather than infinity.
pub fn pulses_to_liters(pulses: u32, pulses_per_liter: f32) -> f32 {
    if pulses_per_liter <= 0.0 {
        return 0.0;
    }
    pulses as f32 / pulses_per_liter
}

/// Feed-side litres since the run baseline.
pub fn liters_in(pulses_in: u32, settings: &Settings) -> f32 {
    pulses_to_liters(pulses_in, settings.pulses_per_liter_in)
}

/// Product-side litres since the run baseline.
pub fn liters_out(pulses_out: u32, settings: &Settings) -> f32 {
    pulses_to_liters(pulses_out, settings.pulses_per_liter_out)
}

/// Product pulses since `Production` was entered.  A counter behind the
/// snapshot (rebased underneath us) clamps to zero instead of wrapping.
pub fn produced_pulses(pulses_out: u32, production_start_pulses: u32) -> u32 {
    pulses_out.saturating_sub(production_start_pulses)
}

/// Litres produced since `Production` was entered, never negative.
pub fn liters_produced(pulses_out: u32, production_start_pulses: u32, settings: &Settings) -> f32 {
    liters_out(produced_pulses(pulses_out, production_start_pulses), settings)
}

// ── Limits ────────────────────────────────────────────────────

/// Which mode limit a production run crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitBreach {
    Volume,
    Runtime,
}

/// Check the mode limits.  Volume is checked before runtime; both
/// comparisons are strict so a run that lands exactly on the limit
/// finishes normally.
pub fn check_limits(
    produced_liters: f32,
    elapsed_ms: u64,
    mode: ProductionMode,
    settings: &Settings,
) -> Option<LimitBreach> {
    if settings
        .volume_limit(mode)
        .is_some_and(|max| produced_liters > max)
    {
        return Some(LimitBreach::Volume);
    }
    if settings
        .runtime_limit_ms(mode)
        .is_some_and(|max| elapsed_ms > max)
    {
        return Some(LimitBreach::Runtime);
    }
    None
}

/// Litres left before the volume limit; `None` when unlimited.
pub fn remaining_liters(produced_liters: f32, mode: ProductionMode, settings: &Settings) -> Option<f32> {
    settings
        .volume_limit(mode)
        .map(|max| (max - produced_liters).max(0.0))
}

/// Seconds left before the runtime limit; `None` when unlimited.
pub fn remaining_secs(elapsed_ms: u64, mode: ProductionMode, settings: &Settings) -> Option<u32> {
    settings
        .runtime_limit_ms(mode)
        .map(|max| (max.saturating_sub(elapsed_ms) / 1000) as u32)
}

// ── Run statistics ────────────────────────────────────────────

/// Water quality and feed volume of one production run.
///
/// Quality is sampled once per control cycle while producing; the feed
/// volume is the inlet side since `Production` was entered.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunStats {
    quality_min: f32,
    quality_max: f32,
    quality_sum: f32,
    samples: u32,
    /// Feed litres drawn by the run.
    pub liters_in: f32,
}

impl RunStats {
    pub fn record_quality(&mut self, ppm: f32) {
        if self.samples == 0 {
            self.quality_min = ppm;
            self.quality_max = ppm;
        } else {
            self.quality_min = self.quality_min.min(ppm);
            self.quality_max = self.quality_max.max(ppm);
        }
        self.quality_sum += ppm;
        self.samples = self.samples.saturating_add(1);
    }

    /// Lowest quality reading, 0 without samples.
    pub fn quality_min(&self) -> f32 {
        self.quality_min
    }

    /// Highest quality reading, 0 without samples.
    pub fn quality_max(&self) -> f32 {
        self.quality_max
    }

    /// Mean quality reading, 0 without samples.
    pub fn quality_avg(&self) -> f32 {
        if self.samples == 0 {
            0.0
        } else {
            self.quality_sum / self.samples as f32
        }
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }
}

// ── Flow rate ─────────────────────────────────────────────────

/// Minimum window over which the rate is recomputed.
const FLOW_WINDOW_MS: u64 = 1000;

/// Product flow-rate estimator (L/min) over a fixed time window.
///
/// Works on the raw product counter so run baselines never produce a
/// negative step.
#[derive(Debug, Default)]
pub struct FlowRateMeter {
    window_start: Option<(u64, u32)>,
    rate_lpm: f32,
}

impl FlowRateMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the raw product counter.  Returns the current estimate.
    pub fn update(&mut self, now_ms: u64, raw_pulses: u32, pulses_per_liter: f32) -> f32 {
        let Some((t0, p0)) = self.window_start else {
            self.window_start = Some((now_ms, raw_pulses));
            return self.rate_lpm;
        };
        let dt = now_ms.saturating_sub(t0);
        if dt >= FLOW_WINDOW_MS {
            let liters = pulses_to_liters(raw_pulses.wrapping_sub(p0), pulses_per_liter);
            self.rate_lpm = liters * 60_000.0 / dt as f32;
            self.window_start = Some((now_ms, raw_pulses));
        }
        self.rate_lpm
    }

    /// Last computed rate in L/min.
    pub fn rate_lpm(&self) -> f32 {
        self.rate_lpm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings::default()
    }

    #[test]
    fn calibration_converts_pulses() {
        let s = settings();
        assert!((liters_out(880, &s) - 1.0).abs() < 1e-6);
        assert!((liters_in(2150, &s) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn zero_calibration_yields_zero() {
        assert_eq!(pulses_to_liters(500, 0.0), 0.0);
        assert_eq!(pulses_to_liters(500, -3.0), 0.0);
    }

    #[test]
    fn produced_never_negative() {
        let s = settings();
        assert_eq!(liters_produced(10, 500, &s), 0.0);
        assert!((liters_produced(1380, 500, &s) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn volume_breach_is_strict() {
        let mut s = settings();
        s.max_volume_manual_liters = 1.0;
        assert_eq!(check_limits(1.0, 0, ProductionMode::Manual, &s), None);
        assert_eq!(
            check_limits(1.01, 0, ProductionMode::Manual, &s),
            Some(LimitBreach::Volume)
        );
    }

    #[test]
    fn volume_checked_before_runtime() {
        let mut s = settings();
        s.max_volume_auto_liters = 1.0;
        s.max_runtime_auto_secs = 1.0;
        assert_eq!(
            check_limits(2.0, 5000, ProductionMode::Auto, &s),
            Some(LimitBreach::Volume)
        );
        assert_eq!(
            check_limits(0.5, 5000, ProductionMode::Auto, &s),
            Some(LimitBreach::Runtime)
        );
    }

    #[test]
    fn unlimited_never_breaches() {
        let mut s = settings();
        s.max_volume_auto_liters = 0.0;
        s.max_runtime_auto_secs = 0.0;
        assert_eq!(check_limits(1e6, u64::MAX, ProductionMode::Auto, &s), None);
        assert_eq!(remaining_liters(3.0, ProductionMode::Auto, &s), None);
        assert_eq!(remaining_secs(0, ProductionMode::Auto, &s), None);
    }

    #[test]
    fn remaining_counts_down_and_floors() {
        let s = settings();
        assert_eq!(remaining_liters(5.0, ProductionMode::Auto, &s), Some(30.0));
        assert_eq!(remaining_liters(50.0, ProductionMode::Auto, &s), Some(0.0));
        assert_eq!(remaining_secs(400_000, ProductionMode::Auto, &s), Some(2000));
        assert_eq!(remaining_secs(9_000_000, ProductionMode::Auto, &s), Some(0));
    }

    #[test]
    fn run_stats_track_quality_range() {
        let mut st = RunStats::default();
        assert_eq!(st.quality_avg(), 0.0);
        for q in [8.0, 4.0, 12.0] {
            st.record_quality(q);
        }
        assert_eq!(st.samples(), 3);
        assert_eq!(st.quality_min(), 4.0);
        assert_eq!(st.quality_max(), 12.0);
        assert!((st.quality_avg() - 8.0).abs() < 1e-6);
    }

    #[test]
    fn flow_rate_over_window() {
        let mut m = FlowRateMeter::new();
        assert_eq!(m.update(0, 0, 880.0), 0.0);
        // 880 pulses (1 L) in 500 ms: window not closed yet
        assert_eq!(m.update(500, 880, 880.0), 0.0);
        // 1 L over 1 s → 60 L/min
        let r = m.update(1000, 880, 880.0);
        assert!((r - 60.0).abs() < 1e-3);
        assert!((m.rate_lpm() - 60.0).abs() < 1e-3);
    }
}
