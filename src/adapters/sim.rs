//! Simulated reverse-osmosis plant.
//!
//! Implements [`SensorPort`] and [`ActuatorPort`] over a small physical
//! model so the controller can run on a host:
//!
//! ```text
//!  feed ──[inlet]──▶ membrane ──permeate──┬─[product]─▶ container ──▶ draw-off
//!                       │                 └─[drain]───▶ drain
//!                       └──concentrate──▶ drain
//! ```
//!
//! Water only moves when the inlet and relay are on and an outlet path is
//! open.  The product meter sits on the permeate line ahead of the split,
//! so it counts during flushes too.  Membrane quality improves while water
//! moves and degrades while it stands.

use std::sync::Arc;

use crate::app::ports::{ActuatorPort, SensorPort};
use crate::config::{ProductionMode, Settings};
use crate::fsm::context::{ActuatorCommands, SensorSnapshot};
use crate::sensors::{PulseCounters, QualityProbe, ppm_to_raw};

/// Physical parameters of the simulated plant.
#[derive(Debug, Clone, Copy)]
pub struct PlantModel {
    /// Feed flow with an outlet open (L/min).
    pub feed_lpm: f32,
    /// Permeate share of the feed.
    pub recovery: f32,
    /// Container volume (L).
    pub container_liters: f32,
    /// Constant draw-off from the container (L/min).
    pub draw_lpm: f32,
    /// Quality of a well-flushed membrane (ppm).
    pub clean_ppm: f32,
    /// Quality after a long standstill (ppm).
    pub stagnant_ppm: f32,
    /// Time constant of the quality drift (s).
    pub quality_tau_secs: f32,
}

impl Default for PlantModel {
    fn default() -> Self {
        Self {
            feed_lpm: 2.0,
            recovery: 0.45,
            container_liters: 40.0,
            draw_lpm: 0.0,
            clean_ppm: 6.0,
            stagnant_ppm: 45.0,
            quality_tau_secs: 20.0,
        }
    }
}

/// Host-side plant driven by the controller outputs.
pub struct SimulatedPlant {
    model: PlantModel,
    counters: Arc<PulseCounters>,
    probe: QualityProbe,
    pulses_per_liter_in: f32,
    pulses_per_liter_out: f32,
    outputs: ActuatorCommands,
    indicators: (bool, bool),
    selector: Option<ProductionMode>,
    hard_fault: bool,
    /// Liters held in the container.
    level_liters: f32,
    membrane_ppm: f32,
    /// Fractional pulses carried between steps.
    carry_in: f32,
    carry_out: f32,
    last_ms: Option<u64>,
}

impl SimulatedPlant {
    pub fn new(model: PlantModel, settings: &Settings) -> Self {
        Self {
            model,
            counters: Arc::new(PulseCounters::new()),
            probe: QualityProbe::new(),
            pulses_per_liter_in: settings.pulses_per_liter_in,
            pulses_per_liter_out: settings.pulses_per_liter_out,
            outputs: ActuatorCommands::all_off(),
            indicators: (false, false),
            selector: None,
            hard_fault: false,
            level_liters: 0.0,
            membrane_ppm: model.stagnant_ppm,
            carry_in: 0.0,
            carry_out: 0.0,
            last_ms: None,
        }
    }

    /// Counters as the meter interrupts would see them.
    pub fn counters(&self) -> Arc<PulseCounters> {
        Arc::clone(&self.counters)
    }

    pub fn set_selector(&mut self, selector: Option<ProductionMode>) {
        self.selector = selector;
    }

    pub fn set_hard_fault(&mut self, active: bool) {
        self.hard_fault = active;
    }

    pub fn set_level_liters(&mut self, liters: f32) {
        self.level_liters = liters.clamp(0.0, self.model.container_liters);
    }

    pub fn level_liters(&self) -> f32 {
        self.level_liters
    }

    pub fn outputs(&self) -> ActuatorCommands {
        self.outputs
    }

    /// `(activity, fault)` indicator levels.
    pub fn indicators(&self) -> (bool, bool) {
        self.indicators
    }

    /// True while water is moving through the membrane.
    pub fn flowing(&self) -> bool {
        let o = &self.outputs;
        o.inlet && o.relay && (o.drain || o.product)
    }

    /// Advance the model to `now_ms`.
    pub fn advance(&mut self, now_ms: u64) {
        let dt_secs = match self.last_ms.replace(now_ms) {
            Some(last) => now_ms.saturating_sub(last) as f32 / 1000.0,
            None => 0.0,
        };
        if dt_secs <= 0.0 {
            return;
        }
        let m = self.model;

        let target_ppm = if self.flowing() {
            let feed = m.feed_lpm * dt_secs / 60.0;
            let permeate = feed * m.recovery;
            self.carry_in += feed * self.pulses_per_liter_in;
            self.carry_out += permeate * self.pulses_per_liter_out;
            let (pin, pout) = (self.carry_in.floor(), self.carry_out.floor());
            self.carry_in -= pin;
            self.carry_out -= pout;
            self.counters.add(pin as u32, pout as u32);
            if self.outputs.product {
                self.level_liters += permeate;
            }
            m.clean_ppm
        } else {
            m.stagnant_ppm
        };

        let alpha = (dt_secs / m.quality_tau_secs).min(1.0);
        self.membrane_ppm += (target_ppm - self.membrane_ppm) * alpha;
        self.level_liters =
            (self.level_liters - m.draw_lpm * dt_secs / 60.0).clamp(0.0, m.container_liters);
    }
}

impl SensorPort for SimulatedPlant {
    fn read_snapshot(&mut self) -> SensorSnapshot {
        let quality = self.probe.update(ppm_to_raw(self.membrane_ppm));
        let cap = self.model.container_liters;
        SensorSnapshot {
            quality_ppm: quality.avg_ppm,
            level_low_wet: self.level_liters >= cap * 0.2,
            level_high_wet: self.level_liters >= cap * 0.9,
            hard_fault: self.hard_fault,
            auto_selected: self.selector == Some(ProductionMode::Auto),
            manual_selected: self.selector == Some(ProductionMode::Manual),
            pulses: self.counters.sample(),
        }
    }
}

impl ActuatorPort for SimulatedPlant {
    fn set_outputs(&mut self, commands: &ActuatorCommands) {
        self.outputs = *commands;
    }

    fn set_indicators(&mut self, activity: bool, fault: bool) {
        self.indicators = (activity, fault);
    }
}
