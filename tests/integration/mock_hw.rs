//! Mock plant and test rig for integration tests.
//!
//! `MockPlant` serves a scripted sensor snapshot and records every actuator
//! call so tests can assert on the full output history without a simulated
//! membrane in the loop.

use osmose::adapters::memory::MemoryStore;
use osmose::adapters::time::ManualClock;
use osmose::app::commands::AppCommand;
use osmose::app::events::AppEvent;
use osmose::app::ports::{ActuatorPort, EventSink, SensorPort};
use osmose::app::service::AppService;
use osmose::config::Settings;
use osmose::fsm::StateId;
use osmose::fsm::context::{ActuatorCommands, SensorSnapshot};

/// Wall-clock time the rig clock starts at.
pub const WALL_START: i64 = 1_700_000_000;

// ── MockPlant ─────────────────────────────────────────────────

#[derive(Default)]
pub struct MockPlant {
    /// Returned verbatim by `read_snapshot`.
    pub snap: SensorSnapshot,
    /// Every distinct output set, in order.
    pub output_log: Vec<ActuatorCommands>,
    pub outputs: ActuatorCommands,
    pub lamps: (bool, bool),
}

#[allow(dead_code)]
impl MockPlant {
    pub fn manual() -> Self {
        let mut p = Self::default();
        p.snap.manual_selected = true;
        p.snap.quality_ppm = 5.0;
        p
    }

    pub fn auto() -> Self {
        let mut p = Self::default();
        p.snap.auto_selected = true;
        p.snap.quality_ppm = 5.0;
        p
    }

    /// Meter pulses arriving between two cycles.
    pub fn feed(&mut self, inlet: u32, product: u32) {
        self.snap.pulses.inlet = self.snap.pulses.inlet.wrapping_add(inlet);
        self.snap.pulses.product = self.snap.pulses.product.wrapping_add(product);
    }

    pub fn set_floats(&mut self, low_wet: bool, high_wet: bool) {
        self.snap.level_low_wet = low_wet;
        self.snap.level_high_wet = high_wet;
    }

    pub fn select(&mut self, auto: bool, manual: bool) {
        self.snap.auto_selected = auto;
        self.snap.manual_selected = manual;
    }
}

impl SensorPort for MockPlant {
    fn read_snapshot(&mut self) -> SensorSnapshot {
        self.snap
    }
}

impl ActuatorPort for MockPlant {
    fn set_outputs(&mut self, commands: &ActuatorCommands) {
        if self.output_log.last() != Some(commands) {
            self.output_log.push(*commands);
        }
        self.outputs = *commands;
    }

    fn set_indicators(&mut self, activity: bool, fault: bool) {
        self.lamps = (activity, fault);
    }
}

// ── Recording sink ────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    /// Every state entered, in order.
    pub fn visited(&self) -> Vec<StateId> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::StateChanged { to, .. } => Some(*to),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Rig ───────────────────────────────────────────────────────

/// Service, plant, clock and sink wired together.
pub struct Rig {
    pub app: AppService<MemoryStore>,
    pub hw: MockPlant,
    pub sink: RecordingSink,
    pub clock: ManualClock,
    pub settings: Settings,
}

#[allow(dead_code)]
impl Rig {
    pub fn new(settings: Settings, hw: MockPlant) -> Self {
        Self::with_store(settings, hw, MemoryStore::new())
    }

    /// Boot against an existing store, as after a power cycle.
    pub fn with_store(settings: Settings, mut hw: MockPlant, store: MemoryStore) -> Self {
        let clock = ManualClock::with_wall_clock(0, WALL_START);
        let mut sink = RecordingSink::default();
        let mut app = AppService::new(settings, store);
        app.start(&clock, &mut hw, &mut sink);
        Self {
            app,
            hw,
            sink,
            clock,
            settings,
        }
    }

    pub fn command(&mut self, cmd: AppCommand) {
        self.app.handle_command(cmd, &mut self.sink);
    }

    /// Advance the clock by `ms` and run one cycle.
    pub fn step(&mut self, ms: u64) {
        self.clock.advance_ms(ms);
        self.app
            .tick(&self.settings, &self.clock, &mut self.hw, &mut self.sink);
    }

    /// Run `n` cycles of `ms` each.
    pub fn run(&mut self, n: usize, ms: u64) {
        for _ in 0..n {
            self.step(ms);
        }
    }

    pub fn state(&self) -> StateId {
        self.app.state()
    }

    /// Copy of the persisted store, for a simulated reboot.
    pub fn store_snapshot(&self) -> MemoryStore {
        self.app.history().storage().clone()
    }
}

// ── Settings presets ──────────────────────────────────────────

/// Short timers, straight to production, interlocks on.
#[allow(dead_code)]
pub fn fast_settings() -> Settings {
    Settings {
        prepare_time_secs: 0,
        auto_flush_enabled: false,
        post_flush_time_secs: 1,
        service_flush_enabled: false,
        ..Settings::default()
    }
}
