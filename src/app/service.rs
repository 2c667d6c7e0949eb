//! Application service: the hexagonal core.
//!
//! [`AppService`] owns the FSM, the safety interlock, the run context and
//! the history engine.  It exposes a clean, hardware-agnostic API.  All
//! I/O flows through port traits injected at call sites, making the entire
//! service testable with mock adapters.
//!
//! ```text
//!  SensorPort ──▶ ┌──────────────────────────────┐ ──▶ EventSink
//!  ClockPort  ──▶ │          AppService           │
//! ActuatorPort ◀──│  FSM · Safety · Accounting    │
//!                 │  History ──▶ StoragePort      │
//!                 └──────────────────────────────┘
//!                        ▲ ControlRequests (any thread)
//! ```

use std::sync::Arc;

use log::{debug, info, warn};

use crate::accounting::{self, FlowRateMeter};
use crate::config::{ProductionMode, Settings};
use crate::error::{SafetyFault, StopReason};
use crate::fsm::context::{ActuatorCommands, InputEdges, RunContext, RunEvent, SensorSnapshot};
use crate::fsm::states::{after_production, build_state_table};
use crate::fsm::{Fsm, StateId};
use crate::history::{HistoryEngine, Sample};
use crate::indicators::IndicatorPatterns;
use crate::requests::ControlRequests;
use crate::safety::{RatioInputs, SafetyInterlock};

use super::commands::AppCommand;
use super::events::{AppEvent, ProcessState, ProcessStatus};
use super::ports::{ActuatorPort, ClockPort, EventSink, SensorPort, StoragePort};

/// Period of the unsolicited status snapshot.
const STATUS_PERIOD_MS: u64 = 10_000;

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

/// The application service orchestrates all domain logic.
pub struct AppService<S: StoragePort> {
    fsm: Fsm,
    ctx: RunContext,
    safety: SafetyInterlock,
    history: HistoryEngine<S>,
    requests: Arc<ControlRequests>,
    flow: FlowRateMeter,
    prev_auto: bool,
    prev_manual: bool,
    last_status_ms: Option<u64>,
    tick_count: u64,
}

impl<S: StoragePort> AppService<S> {
    /// Construct the service and load the persisted production table.
    ///
    /// Does **not** start the FSM; call [`start`](Self::start) next.
    pub fn new(settings: Settings, storage: S) -> Self {
        Self {
            fsm: Fsm::new(build_state_table(), StateId::Idle),
            ctx: RunContext::new(settings),
            safety: SafetyInterlock::new(),
            history: HistoryEngine::new(storage),
            requests: Arc::new(ControlRequests::new()),
            flow: FlowRateMeter::new(),
            prev_auto: false,
            prev_manual: false,
            last_status_ms: None,
            tick_count: 0,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Enter `Idle` against the current plant inputs.
    ///
    /// The selector position at boot is taken as the edge reference, so a
    /// switch already in "manual" does not start a run by itself.
    pub fn start(
        &mut self,
        clock: &impl ClockPort,
        hw: &mut impl SensorPort,
        sink: &mut impl EventSink,
    ) {
        self.ctx.now_ms = clock.now_ms();
        self.ctx.wall_secs = clock.wall_clock_secs();
        self.ctx.idle_since_ms = self.ctx.now_ms;

        let snap = hw.read_snapshot();
        self.ctx.sensors = snap;
        self.prev_auto = snap.auto_selected;
        self.prev_manual = snap.manual_selected;

        self.fsm.start(&mut self.ctx);
        if self.ctx.settings.auto_start {
            info!("auto-start enabled, requesting a run");
            self.requests.request_start();
        }
        sink.emit(&AppEvent::Started(self.fsm.current_state()));
        info!("AppService started in {}", self.fsm.current_state());
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one full control cycle:
    /// read inputs → requests → safety → FSM → outputs → history → events.
    ///
    /// The `hw` parameter satisfies **both** [`SensorPort`] and
    /// [`ActuatorPort`]; this avoids a double mutable borrow while
    /// keeping the port boundary explicit.
    pub fn tick(
        &mut self,
        settings: &Settings,
        clock: &impl ClockPort,
        hw: &mut (impl SensorPort + ActuatorPort),
        sink: &mut impl EventSink,
    ) {
        self.tick_count += 1;
        let prev_state = self.fsm.current_state();

        // 1. Time and settings snapshot
        let now = clock.now_ms();
        self.ctx.now_ms = now;
        self.ctx.wall_secs = clock.wall_clock_secs();
        self.ctx.settings = *settings;

        // 2. Inputs
        let snap = hw.read_snapshot();
        self.ctx.sensors = snap;

        // 3. Selector edges
        self.update_edges(&snap);

        // 4. Run-relative counters
        self.ctx.refresh_counters();

        // 5. Operator requests, stop before start
        let pending = self.requests.take();
        if pending.stop {
            self.handle_stop();
        }
        if pending.start {
            self.handle_start();
        }

        if snap.selector_off() {
            // 6. Selector off: everything stops, nothing else runs
            if self.fsm.current_state() != StateId::Idle {
                info!("selector off, stopping");
                self.ctx.reason = Some(StopReason::Stopped);
                self.ctx.idle_since_ms = self.ctx.now_ms;
                self.fsm.force_transition(StateId::Idle, &mut self.ctx);
            }
        } else {
            // 7. Safety interlock
            self.run_interlock(&snap, sink);

            // 8. FSM step
            self.fsm.tick(&mut self.ctx);
        }

        // 9. Outputs
        self.apply_outputs(hw);

        // 10. Run lifecycle into the production table
        self.drain_run_events(sink);

        // 11. Flow rate and time series
        let flow_lpm = self
            .flow
            .update(now, snap.pulses.product, settings.pulses_per_liter_out);
        let liters = self.ctx.liters_produced();
        if let Some(res) = self.history.sample_if_due(now, || Sample {
            quality_ppm: snap.quality_ppm,
            flow_lpm,
            liters,
        }) {
            sink.emit(&AppEvent::HistoryUpdated(res));
        }

        // 12. Outbound state
        let new_state = self.fsm.current_state();
        if new_state != prev_state {
            sink.emit(&AppEvent::StateChanged {
                from: prev_state,
                to: new_state,
            });
        }
        let status_due = self
            .last_status_ms
            .map_or(true, |last| now.saturating_sub(last) >= STATUS_PERIOD_MS);
        if new_state != prev_state || status_due {
            self.last_status_ms = Some(now);
            sink.emit(&AppEvent::Status(self.status()));
        }

        debug!(
            "cycle {} | {} | q={:.1}ppm in={} out={} | {:.2} L",
            self.tick_count,
            new_state,
            snap.quality_ppm,
            self.ctx.pulses_in,
            self.ctx.pulses_out,
            liters
        );
    }

    // ── Command handling ──────────────────────────────────────

    /// Process an external command.  Start and stop are queued for the
    /// next cycle; table maintenance happens immediately.
    pub fn handle_command(&mut self, cmd: AppCommand, sink: &mut impl EventSink) {
        match cmd {
            AppCommand::Start => self.requests.request_start(),
            AppCommand::Stop => self.requests.request_stop(),
            AppCommand::ClearProductionTable => {
                self.history.clear();
                sink.emit(&AppEvent::TableChanged);
            }
        }
    }

    /// Shared request flags for producers on other threads.
    pub fn requests(&self) -> Arc<ControlRequests> {
        Arc::clone(&self.requests)
    }

    // ── Queries ───────────────────────────────────────────────

    /// Current FSM state.
    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    /// Current state with its reason attached.
    pub fn process_state(&self) -> ProcessState {
        ProcessState::from_parts(self.fsm.current_state(), self.ctx.reason)
    }

    /// Reason recorded for the last finished run.
    pub fn last_stop_reason(&self) -> Option<StopReason> {
        self.ctx.last_stop_reason
    }

    /// Litres of the current run (live) or the last run (frozen).
    pub fn liters_produced(&self) -> f32 {
        self.ctx.liters_produced()
    }

    /// Product flow rate in L/min.
    pub fn flow_lpm(&self) -> f32 {
        self.flow.rate_lpm()
    }

    /// Automatic starts are suppressed until auto mode is re-activated.
    pub fn auto_blocked(&self) -> bool {
        self.ctx.auto_blocked
    }

    /// Current active fault bitmask (0 = no faults).
    pub fn fault_flags(&self) -> u8 {
        self.safety.faults()
    }

    /// Outputs requested by the current state.
    pub fn commands(&self) -> ActuatorCommands {
        self.ctx.commands
    }

    /// Total control ticks executed since startup.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn history(&self) -> &HistoryEngine<S> {
        &self.history
    }

    /// Build a status snapshot from the current context.
    pub fn status(&self) -> ProcessStatus {
        let state = self.process_state();
        let mode = self.run_mode();
        let liters = self.ctx.liters_produced();
        let runtime_ms = if self.fsm.current_state() == StateId::Production {
            self.ctx.ms_in_state()
        } else {
            0
        };
        let producing = self.ctx.in_production;
        let totals = self.history.totals();
        ProcessStatus {
            state: state.name(),
            reason: state.reason().map(StopReason::as_str),
            quality_ppm: self.ctx.sensors.quality_ppm,
            liters,
            flow_lpm: self.flow.rate_lpm(),
            remaining_liters: producing
                .then(|| accounting::remaining_liters(liters, mode, &self.ctx.settings))
                .flatten(),
            remaining_secs: producing
                .then(|| accounting::remaining_secs(runtime_ms, mode, &self.ctx.settings))
                .flatten(),
            mode,
            runtime_secs: (runtime_ms / 1000) as u32,
            fault_flags: self.safety.faults(),
            total_liters_out: totals.liters_out,
            total_liters_in: totals.liters_in,
        }
    }

    // ── Internal ──────────────────────────────────────────────

    /// Mode of the run in progress, or the selector's mode when idle.
    fn run_mode(&self) -> ProductionMode {
        if self.fsm.current_state().is_running() {
            self.ctx.run_mode
        } else {
            self.ctx.selected_mode()
        }
    }

    fn update_edges(&mut self, snap: &SensorSnapshot) {
        let edges = InputEdges {
            auto_rising: snap.auto_selected && !self.prev_auto,
            manual_rising: snap.manual_selected && !self.prev_manual,
        };
        self.prev_auto = snap.auto_selected;
        self.prev_manual = snap.manual_selected;
        self.ctx.edges = edges;

        if edges.auto_rising && self.ctx.auto_blocked {
            info!("automatic mode re-activated, auto block cleared");
            self.ctx.auto_blocked = false;
        }
        if edges.manual_rising && self.fsm.current_state().accepts_start() {
            info!("manual switch edge, start latched");
            self.ctx.start_latched = true;
        }
        if !snap.manual_selected {
            self.ctx.start_latched = false;
        }
    }

    fn handle_stop(&mut self) {
        let state = self.fsm.current_state();
        info!("stop requested in {}", state);
        self.ctx.start_latched = false;
        if self.ctx.sensors.auto_selected {
            self.ctx.auto_blocked = true;
        }
        let target = match state {
            StateId::Idle => return,
            StateId::Production => after_production(&self.ctx),
            _ => StateId::Idle,
        };
        // Operator stops restart the idle period of the service flush.
        self.ctx.idle_since_ms = self.ctx.now_ms;
        self.ctx.reason = Some(StopReason::Stopped);
        self.fsm.force_transition(target, &mut self.ctx);
    }

    fn handle_start(&mut self) {
        let state = self.fsm.current_state();
        if !state.accepts_start() {
            info!("start ignored in {}", state);
            return;
        }
        if self.ctx.sensors.selector_off() {
            warn!("start ignored, mode selector is off");
            return;
        }
        info!("start requested in {}", state);
        self.ctx.auto_blocked = false;
        self.ctx.reason = None;
        self.fsm.force_transition(StateId::Prepare, &mut self.ctx);
    }

    fn run_interlock(&mut self, snap: &SensorSnapshot, sink: &mut impl EventSink) {
        let ratio = RatioInputs {
            pulses_in: self.ctx.pulses_in,
            pulses_out: self.ctx.pulses_out,
            ms_in_state: self.ctx.ms_in_state(),
        };
        let flags = self
            .safety
            .evaluate(snap, ratio, &self.ctx.settings, self.ctx.now_ms);
        if flags == 0 || self.fsm.current_state() == StateId::Error {
            return;
        }
        let Some(fault) = SafetyFault::first_in(flags) else {
            return;
        };
        let reason = fault.reason();
        warn!("Safety fault! flags=0b{:08b} ({})", flags, reason);
        self.ctx.reason = Some(reason);
        self.fsm.force_transition(StateId::Error, &mut self.ctx);
        sink.emit(&AppEvent::FaultDetected { flags, reason });
    }

    /// Translate FSM commands and indicator patterns into port calls.
    /// The interlock learns the inlet command at the time it is applied.
    fn apply_outputs(&mut self, hw: &mut impl ActuatorPort) {
        hw.set_outputs(&self.ctx.commands);
        self.safety
            .set_inlet_commanded(self.ctx.commands.inlet, self.ctx.now_ms);
        let (activity, fault) =
            IndicatorPatterns::for_state(self.fsm.current_state()).levels(self.ctx.now_ms);
        hw.set_indicators(activity, fault);
    }

    fn drain_run_events(&mut self, sink: &mut impl EventSink) {
        while let Some(event) = self.ctx.pop_run_event() {
            let changed = self.history.apply(event);
            if !changed {
                continue;
            }
            match event {
                RunEvent::Started { mode, .. } => sink.emit(&AppEvent::RunStarted { mode }),
                RunEvent::Ended { reason, liters, .. } => {
                    sink.emit(&AppEvent::RunEnded { reason, liters })
                }
            }
            sink.emit(&AppEvent::TableChanged);
        }
    }
}
