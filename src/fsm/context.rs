//! Shared mutable context threaded through every FSM handler.
//!
//! `RunContext` is the single struct that state handlers read from and
//! write to.  It contains the latest sensor snapshot, the actuator command
//! outputs, timing, the settings snapshot for this cycle, the run
//! bookkeeping (counter baseline, stop reason, latches) and an outbox of
//! run lifecycle events that the service drains into the history engine
//! after each FSM step.

use heapless::Deque;
use log::warn;

use crate::accounting::{self, RunStats};
use crate::config::{ProductionMode, Settings};
use crate::error::StopReason;
use crate::sensors::{CounterBaseline, PulseSample};

// ---------------------------------------------------------------------------
// Sensor snapshot (read-only to state handlers; written by the service)
// ---------------------------------------------------------------------------

/// A point-in-time snapshot of every input of the plant.
#[derive(Debug, Clone, Copy, Default)]
pub struct SensorSnapshot {
    /// Smoothed water quality (TDS, ppm).
    pub quality_ppm: f32,
    /// Lower level float is wet.
    pub level_low_wet: bool,
    /// Upper level float is wet.
    pub level_high_wet: bool,
    /// External hard-fault line asserted (leak sensor, pressure switch).
    pub hard_fault: bool,
    /// Mode selector in "automatic".
    pub auto_selected: bool,
    /// Mode selector in "manual".
    pub manual_selected: bool,
    /// Raw, free-running meter counters.
    pub pulses: PulseSample,
}

impl SensorSnapshot {
    /// Neither mode selected: the operator switched the plant off.
    pub fn selector_off(&self) -> bool {
        !self.auto_selected && !self.manual_selected
    }

    /// Both floats wet.
    pub fn container_full(&self) -> bool {
        self.level_low_wet && self.level_high_wet
    }

    /// Upper float wet below a dry lower float cannot happen physically.
    pub fn levels_inconsistent(&self) -> bool {
        self.level_high_wet && !self.level_low_wet
    }
}

/// Rising edges of the mode selector, derived once per cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputEdges {
    pub auto_rising: bool,
    pub manual_rising: bool,
}

// ---------------------------------------------------------------------------
// Actuator commands (written by state handlers; applied by the service)
// ---------------------------------------------------------------------------

/// Valve and relay outputs requested by the current state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActuatorCommands {
    /// Feed water inlet valve.
    pub inlet: bool,
    /// Membrane outlet to drain (flush path).
    pub drain: bool,
    /// Membrane outlet to the product container.
    pub product: bool,
    /// Main relay (booster pump).
    pub relay: bool,
}

impl ActuatorCommands {
    /// All outputs off: safe default.
    pub const fn all_off() -> Self {
        Self {
            inlet: false,
            drain: false,
            product: false,
            relay: false,
        }
    }

    /// Pressurise the membrane with nothing flowing out.
    pub const fn prepare() -> Self {
        Self {
            inlet: true,
            relay: true,
            ..Self::all_off()
        }
    }

    /// Feed on, membrane output to drain.
    pub const fn flush() -> Self {
        Self {
            inlet: true,
            relay: true,
            drain: true,
            product: false,
        }
    }

    /// Feed on, membrane output to the product container.
    pub const fn produce() -> Self {
        Self {
            inlet: true,
            relay: true,
            drain: false,
            product: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Run lifecycle events (outbox drained by the service)
// ---------------------------------------------------------------------------

/// Production run boundaries, consumed by the history engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunEvent {
    Started {
        mode: ProductionMode,
        at_secs: i64,
    },
    Ended {
        reason: StopReason,
        liters: f32,
        stats: RunStats,
        at_secs: i64,
    },
}

const RUN_EVENT_CAP: usize = 4;

// ---------------------------------------------------------------------------
// RunContext
// ---------------------------------------------------------------------------

/// The shared context passed to every state handler function.
pub struct RunContext {
    // -- Timing --
    /// Monotonic time of the current cycle (ms since boot).
    pub now_ms: u64,
    /// Wall-clock time of the current cycle (Unix seconds).
    pub wall_secs: i64,
    /// When the current state was entered.  Maintained by the engine.
    pub state_entered_ms: u64,

    // -- Inputs --
    pub sensors: SensorSnapshot,
    pub edges: InputEdges,
    /// Settings snapshot for this cycle.
    pub settings: Settings,

    // -- Outputs --
    pub commands: ActuatorCommands,

    // -- Counters --
    baseline: CounterBaseline,
    /// Inlet pulses since the run baseline.
    pub pulses_in: u32,
    /// Product pulses since the run baseline.
    pub pulses_out: u32,
    /// `pulses_out` at the moment `Production` was entered.
    pub production_start_pulses: u32,
    /// `pulses_in` at the moment `Production` was entered.
    pub production_start_inlet: u32,

    // -- Run bookkeeping --
    /// Mode captured when the cycle entered `Prepare`.
    pub run_mode: ProductionMode,
    /// True between `Production` entry and exit.
    pub in_production: bool,
    /// Volume of the last finished run, frozen at stop time.
    pub final_liters: f32,
    /// Quality and feed of the current or last run.
    pub run_stats: RunStats,
    /// Automatic restarts suppressed until auto mode is re-activated.
    pub auto_blocked: bool,
    /// A manual start edge is waiting for `Idle` to pick it up.
    pub start_latched: bool,
    /// Reason for the pending or current stop; shown in `Info`/`Error`.
    pub reason: Option<StopReason>,
    /// Reason recorded for the last finished run.
    pub last_stop_reason: Option<StopReason>,
    /// A run stopped and its history row has not been closed yet.
    pub production_ended: bool,
    /// The manual runtime limit ended the run; `PostFlush` goes to `Info`.
    pub runtime_timeout: bool,
    /// `Info` should be resumed after a service flush.
    pub info_pending: bool,
    /// Start of the current idle period, for the service flush interval.
    pub idle_since_ms: u64,

    run_events: Deque<RunEvent, RUN_EVENT_CAP>,
}

impl RunContext {
    /// Create a new context with the given settings.
    pub fn new(settings: Settings) -> Self {
        Self {
            now_ms: 0,
            wall_secs: 0,
            state_entered_ms: 0,
            sensors: SensorSnapshot::default(),
            edges: InputEdges::default(),
            settings,
            commands: ActuatorCommands::all_off(),
            baseline: CounterBaseline::default(),
            pulses_in: 0,
            pulses_out: 0,
            production_start_pulses: 0,
            production_start_inlet: 0,
            run_mode: ProductionMode::Auto,
            in_production: false,
            final_liters: 0.0,
            run_stats: RunStats::default(),
            auto_blocked: false,
            start_latched: false,
            reason: None,
            last_stop_reason: None,
            production_ended: false,
            runtime_timeout: false,
            info_pending: false,
            idle_since_ms: 0,
            run_events: Deque::new(),
        }
    }

    /// Milliseconds elapsed since the current state was entered.
    pub fn ms_in_state(&self) -> u64 {
        self.now_ms.saturating_sub(self.state_entered_ms)
    }

    /// Recompute the run-relative counters from the latest raw snapshot.
    pub fn refresh_counters(&mut self) {
        let rel = self.baseline.relative(self.sensors.pulses);
        self.pulses_in = rel.inlet;
        self.pulses_out = rel.product;
    }

    /// Start a new counting window at the current raw counter values.
    pub fn rebase_counters(&mut self) {
        self.baseline.rebase(self.sensors.pulses);
        self.pulses_in = 0;
        self.pulses_out = 0;
        self.production_start_pulses = 0;
        self.production_start_inlet = 0;
    }

    /// Mode implied by the selector right now.
    pub fn selected_mode(&self) -> ProductionMode {
        if self.sensors.manual_selected {
            ProductionMode::Manual
        } else {
            ProductionMode::Auto
        }
    }

    /// Litres produced by the current run (live) or the last run (frozen).
    pub fn liters_produced(&self) -> f32 {
        if self.in_production {
            accounting::liters_produced(
                self.pulses_out,
                self.production_start_pulses,
                &self.settings,
            )
        } else {
            self.final_liters
        }
    }

    /// Start the statistics of a new production run.
    pub fn begin_run_stats(&mut self) {
        self.production_start_inlet = self.pulses_in;
        self.run_stats = RunStats::default();
        self.run_stats.record_quality(self.sensors.quality_ppm);
    }

    /// Fold the latest quality reading and feed count into the run.
    pub fn update_run_stats(&mut self) {
        self.run_stats.record_quality(self.sensors.quality_ppm);
        self.track_feed();
    }

    fn track_feed(&mut self) {
        let feed = self.pulses_in.saturating_sub(self.production_start_inlet);
        self.run_stats.liters_in = accounting::liters_in(feed, &self.settings);
    }

    /// Mark the current production run as finished.  Called once from the
    /// `Production` exit action.
    pub fn finish_production(&mut self) {
        self.track_feed();
        self.final_liters = self.liters_produced();
        self.in_production = false;
        self.last_stop_reason = Some(self.reason.unwrap_or(StopReason::Stopped));
        self.production_ended = true;
        self.idle_since_ms = self.now_ms;
    }

    /// Close the history row of a finished run exactly once.
    pub fn close_run(&mut self) {
        if !self.production_ended {
            return;
        }
        self.production_ended = false;
        let reason = self.last_stop_reason.unwrap_or(StopReason::Stopped);
        self.push_run_event(RunEvent::Ended {
            reason,
            liters: self.final_liters,
            stats: self.run_stats,
            at_secs: self.wall_secs,
        });
    }

    /// Queue a run lifecycle event for the history engine.
    pub fn push_run_event(&mut self, event: RunEvent) {
        if self.run_events.push_back(event).is_err() {
            warn!("run event outbox full, dropping {:?}", event);
        }
    }

    /// Take the next queued run event.
    pub fn pop_run_event(&mut self) -> Option<RunEvent> {
        self.run_events.pop_front()
    }
}
