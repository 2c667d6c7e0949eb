//! GPIO plant adapter.
//!
//! Bridges real pins to [`SensorPort`] and [`ActuatorPort`] through the
//! `embedded-hal` 1.0 digital traits, so any HAL (ESP-IDF, RP2040, a Linux
//! GPIO character device) can drive the controller.
//!
//! - Inputs are **active-low** (switches and floats pull to ground against
//!   the internal pull-ups).
//! - Each output has its own polarity; relay boards behind an I/O expander
//!   are usually active-low.
//! - The quality probe is read through an [`AdcSource`] and smoothed by a
//!   [`QualityProbe`].
//! - Pulse counters are fed by the meter interrupts, which only hold an
//!   `Arc<PulseCounters>`.
//!
//! A pin that fails to read keeps its previous level; a failed write is
//! logged and retried on the next cycle.

use std::sync::Arc;

use embedded_hal::digital::{InputPin, OutputPin, PinState};
use log::warn;

use crate::app::ports::{ActuatorPort, SensorPort};
use crate::error::IoError;
use crate::fsm::context::{ActuatorCommands, SensorSnapshot};
use crate::sensors::{PulseCounters, QualityProbe};

/// Raw access to the quality probe ADC channel.
pub trait AdcSource {
    fn read_raw(&mut self) -> Result<u16, IoError>;
}

/// Digital inputs of the plant.
pub struct PlantInputs<I> {
    pub level_low: I,
    pub level_high: I,
    pub hard_fault: I,
    pub select_auto: I,
    pub select_manual: I,
}

/// One output with its active level.
pub struct Output<O> {
    pin: O,
    active_low: bool,
    name: &'static str,
}

impl<O: OutputPin> Output<O> {
    pub fn active_high(pin: O, name: &'static str) -> Self {
        Self {
            pin,
            active_low: false,
            name,
        }
    }

    pub fn active_low(pin: O, name: &'static str) -> Self {
        Self {
            pin,
            active_low: true,
            name,
        }
    }

    fn set(&mut self, on: bool) {
        let level = PinState::from(on != self.active_low);
        if self.pin.set_state(level).is_err() {
            warn!("gpio: {}", IoError::OutputWrite(self.name));
        }
    }
}

/// Valve, relay and indicator outputs of the plant.
pub struct PlantOutputs<O> {
    pub inlet: Output<O>,
    pub drain: Output<O>,
    pub product: Output<O>,
    pub relay: Output<O>,
    pub activity_led: Output<O>,
    pub fault_led: Output<O>,
}

/// Concrete adapter that combines all plant I/O behind the port traits.
pub struct GpioPlant<I, O, A> {
    inputs: PlantInputs<I>,
    outputs: PlantOutputs<O>,
    adc: A,
    probe: QualityProbe,
    counters: Arc<PulseCounters>,
    last: SensorSnapshot,
}

impl<I, O, A> GpioPlant<I, O, A>
where
    I: InputPin,
    O: OutputPin,
    A: AdcSource,
{
    pub fn new(
        inputs: PlantInputs<I>,
        outputs: PlantOutputs<O>,
        adc: A,
        counters: Arc<PulseCounters>,
    ) -> Self {
        Self {
            inputs,
            outputs,
            adc,
            probe: QualityProbe::new(),
            counters,
            last: SensorSnapshot::default(),
        }
    }

    /// Counters for the meter interrupt handlers.
    pub fn counters(&self) -> Arc<PulseCounters> {
        Arc::clone(&self.counters)
    }
}

/// Active-low read; keeps `previous` if the pin cannot be read.
fn read_active_low(pin: &mut impl InputPin, name: &'static str, previous: bool) -> bool {
    match pin.is_low() {
        Ok(active) => active,
        Err(_) => {
            warn!("gpio: {}", IoError::InputRead(name));
            previous
        }
    }
}

// ── SensorPort implementation ─────────────────────────────────

impl<I, O, A> SensorPort for GpioPlant<I, O, A>
where
    I: InputPin,
    O: OutputPin,
    A: AdcSource,
{
    fn read_snapshot(&mut self) -> SensorSnapshot {
        let prev = self.last;
        let quality_ppm = match self.adc.read_raw() {
            Ok(raw) => self.probe.update(raw).avg_ppm,
            Err(e) => {
                warn!("gpio: {}", e);
                prev.quality_ppm
            }
        };
        let inp = &mut self.inputs;
        let snap = SensorSnapshot {
            quality_ppm,
            level_low_wet: read_active_low(&mut inp.level_low, "level_low", prev.level_low_wet),
            level_high_wet: read_active_low(&mut inp.level_high, "level_high", prev.level_high_wet),
            hard_fault: read_active_low(&mut inp.hard_fault, "hard_fault", prev.hard_fault),
            auto_selected: read_active_low(&mut inp.select_auto, "select_auto", prev.auto_selected),
            manual_selected: read_active_low(
                &mut inp.select_manual,
                "select_manual",
                prev.manual_selected,
            ),
            pulses: self.counters.sample(),
        };
        self.last = snap;
        snap
    }
}

// ── ActuatorPort implementation ───────────────────────────────

impl<I, O, A> ActuatorPort for GpioPlant<I, O, A>
where
    I: InputPin,
    O: OutputPin,
    A: AdcSource,
{
    fn set_outputs(&mut self, commands: &ActuatorCommands) {
        let out = &mut self.outputs;
        out.inlet.set(commands.inlet);
        out.drain.set(commands.drain);
        out.product.set(commands.product);
        out.relay.set(commands.relay);
    }

    fn set_indicators(&mut self, activity: bool, fault: bool) {
        self.outputs.activity_led.set(activity);
        self.outputs.fault_led.set(fault);
    }
}
