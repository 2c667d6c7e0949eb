//! Process settings
//!
//! All tunable parameters for the Osmose controller.  The core never
//! persists settings; it reads one resolved [`Settings`] snapshot per
//! control cycle.  The JSON field names match the `config.json` keys the
//! web front-end writes, and any missing key takes its default.

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;

/// Production mode, chosen by the front-panel selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductionMode {
    Auto,
    Manual,
}

impl core::fmt::Display for ProductionMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Resolved process settings snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    // --- Flow meters ---
    /// Inlet meter calibration (pulses per litre)
    pub pulses_per_liter_in: f32,
    /// Product meter calibration (pulses per litre)
    pub pulses_per_liter_out: f32,

    // --- Water quality ---
    /// Quality (ppm) below which flushing ends and production starts
    #[serde(rename = "tdsLimit")]
    pub quality_limit_ppm: f32,
    /// Absolute maximum quality (ppm) tolerated during production
    #[serde(rename = "tdsMaxAllowed")]
    pub quality_max_ppm: f32,

    // --- Limits (0 or negative = unlimited) ---
    #[serde(rename = "maxRuntimeAutoSec")]
    pub max_runtime_auto_secs: f32,
    #[serde(rename = "maxRuntimeManualSec")]
    pub max_runtime_manual_secs: f32,
    #[serde(rename = "maxProductionAutoLiters")]
    pub max_volume_auto_liters: f32,
    #[serde(rename = "maxProductionManualLiters")]
    pub max_volume_manual_liters: f32,

    // --- Phase timers ---
    #[serde(rename = "prepareTimeSec")]
    pub prepare_time_secs: u32,
    #[serde(rename = "autoflushEnabled")]
    pub auto_flush_enabled: bool,
    #[serde(rename = "maxFlushTimeSec")]
    pub max_flush_time_secs: u32,
    #[serde(rename = "postflushEnabled")]
    pub post_flush_enabled: bool,
    #[serde(rename = "postflushTimeSec")]
    pub post_flush_time_secs: u32,
    #[serde(rename = "serviceFlushEnabled")]
    pub service_flush_enabled: bool,
    #[serde(rename = "serviceFlushIntervalSec")]
    pub service_flush_interval_secs: u32,
    #[serde(rename = "serviceFlushTimeSec")]
    pub service_flush_time_secs: u32,

    /// Start a run once right after boot
    pub auto_start: bool,

    // --- Interlocks ---
    pub afterflow_check_enabled: bool,
    /// Time after inlet close during which meter movement is tolerated (ms)
    pub afterflow_grace_ms: u32,
    pub ratio_check_enabled: bool,
    /// Minimum product/feed pulse ratio
    pub min_flow_ratio: f32,
    /// Feed pulses required before the ratio is trusted
    pub ratio_min_pulses: u32,
    /// Time in state required before the ratio is trusted (ms)
    pub ratio_min_state_ms: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            // Flow meters
            pulses_per_liter_in: 1075.0,
            pulses_per_liter_out: 880.0,

            // Quality
            quality_limit_ppm: 13.0,
            quality_max_ppm: 30.0,

            // Limits
            max_runtime_auto_secs: 2400.0,   // 40 min
            max_runtime_manual_secs: 3000.0, // 50 min
            max_volume_auto_liters: 35.0,
            max_volume_manual_liters: 45.0,

            // Phases
            prepare_time_secs: 10,
            auto_flush_enabled: true,
            max_flush_time_secs: 180,
            post_flush_enabled: true,
            post_flush_time_secs: 10,
            service_flush_enabled: true,
            service_flush_interval_secs: 86_400, // daily
            service_flush_time_secs: 60,

            auto_start: false,

            // Interlocks
            afterflow_check_enabled: true,
            afterflow_grace_ms: 500,
            ratio_check_enabled: true,
            min_flow_ratio: 0.3,
            ratio_min_pulses: 50,
            ratio_min_state_ms: 3000,
        }
    }
}

impl Settings {
    /// Volume limit for `mode`; `None` when unlimited.
    pub fn volume_limit(&self, mode: ProductionMode) -> Option<f32> {
        let limit = match mode {
            ProductionMode::Auto => self.max_volume_auto_liters,
            ProductionMode::Manual => self.max_volume_manual_liters,
        };
        (limit > 0.0).then_some(limit)
    }

    /// Runtime limit for `mode` in milliseconds; `None` when unlimited.
    pub fn runtime_limit_ms(&self, mode: ProductionMode) -> Option<u64> {
        let secs = match mode {
            ProductionMode::Auto => self.max_runtime_auto_secs,
            ProductionMode::Manual => self.max_runtime_manual_secs,
        };
        (secs > 0.0).then(|| (f64::from(secs) * 1000.0) as u64)
    }

    /// Range-check every field.  Called by config adapters before persisting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1.0..=100_000.0).contains(&self.pulses_per_liter_in) {
            return Err(ConfigError::ValidationFailed(
                "pulsesPerLiterIn must be 1–100000",
            ));
        }
        if !(1.0..=100_000.0).contains(&self.pulses_per_liter_out) {
            return Err(ConfigError::ValidationFailed(
                "pulsesPerLiterOut must be 1–100000",
            ));
        }
        if !(0.0..=2000.0).contains(&self.quality_limit_ppm) {
            return Err(ConfigError::ValidationFailed("tdsLimit must be 0–2000"));
        }
        if self.quality_max_ppm <= self.quality_limit_ppm {
            return Err(ConfigError::ValidationFailed(
                "tdsMaxAllowed must be > tdsLimit",
            ));
        }
        if self.prepare_time_secs > 3600 {
            return Err(ConfigError::ValidationFailed(
                "prepareTimeSec must be 0–3600",
            ));
        }
        if self.max_flush_time_secs == 0 || self.max_flush_time_secs > 3600 {
            return Err(ConfigError::ValidationFailed(
                "maxFlushTimeSec must be 1–3600",
            ));
        }
        if self.post_flush_time_secs > 3600 {
            return Err(ConfigError::ValidationFailed(
                "postflushTimeSec must be 0–3600",
            ));
        }
        if self.service_flush_enabled && self.service_flush_interval_secs < 60 {
            return Err(ConfigError::ValidationFailed(
                "serviceFlushIntervalSec must be >= 60",
            ));
        }
        if self.service_flush_time_secs > 3600 {
            return Err(ConfigError::ValidationFailed(
                "serviceFlushTimeSec must be 0–3600",
            ));
        }
        if !(0.0..=1.0).contains(&self.min_flow_ratio) {
            return Err(ConfigError::ValidationFailed(
                "minFlowRatio must be 0.0–1.0",
            ));
        }
        if self.afterflow_grace_ms > 60_000 {
            return Err(ConfigError::ValidationFailed(
                "afterflowGraceMs must be 0–60000",
            ));
        }
        Ok(())
    }
}
