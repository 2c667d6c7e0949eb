//! Osmose host simulator: main entry point.
//!
//! Drives the controller core against a simulated plant on the host.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  SimulatedPlant     LogEventSink   JsonConfigFile   Clock      │
//! │  (Sensor+Actuator)  (EventSink)    (ConfigPort)     (Manual /  │
//! │                                    FileStore        System)    │
//! │                                    (StoragePort)               │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              AppService (pure logic)                   │    │
//! │  │  FSM · Safety · Accounting · History                   │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! By default simulated time runs as fast as the host allows; `--realtime`
//! paces the loop on the system clock instead.
#![deny(unused_must_use)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use log::info;

use osmose::adapters::file_store::FileStore;
use osmose::adapters::json_config::JsonConfigFile;
use osmose::adapters::log_sink::LogEventSink;
use osmose::adapters::memory::MemoryStore;
use osmose::adapters::sim::{PlantModel, SimulatedPlant};
use osmose::adapters::time::{ManualClock, SystemClock};
use osmose::app::commands::AppCommand;
use osmose::app::ports::{ClockPort, ConfigPort, StoragePort};
use osmose::app::service::AppService;
use osmose::config::{ProductionMode, Settings};
use osmose::error::Error;

// ── Command line ──────────────────────────────────────────────

/// Front-panel mode selector position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Selector {
    Auto,
    Manual,
    Off,
}

impl From<Selector> for Option<ProductionMode> {
    fn from(s: Selector) -> Self {
        match s {
            Selector::Auto => Some(ProductionMode::Auto),
            Selector::Manual => Some(ProductionMode::Manual),
            Selector::Off => None,
        }
    }
}

#[derive(Debug, Parser)]
#[command(version, about = "Reverse-osmosis controller simulator")]
struct Cli {
    /// Settings file; created with defaults if missing
    #[arg(long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,

    /// Directory for the production table; kept in memory if omitted
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Number of control cycles to run
    #[arg(long, default_value_t = 18_000)]
    cycles: u64,

    /// Control cycle period in milliseconds
    #[arg(long, default_value_t = 100)]
    cycle_ms: u64,

    /// Pace the loop on the wall clock
    #[arg(long)]
    realtime: bool,

    /// Mode selector position
    #[arg(long, value_enum, default_value_t = Selector::Auto)]
    mode: Selector,

    /// Post one start request after boot
    #[arg(long)]
    start: bool,

    /// Initial container level in litres
    #[arg(long, default_value_t = 0.0)]
    level: f32,

    /// Constant draw-off from the container (L/min)
    #[arg(long, default_value_t = 0.0)]
    draw_lpm: f32,
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    info!("╔══════════════════════════════════════╗");
    info!("║  Osmose simulator v{:<18}║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 1. Settings ───────────────────────────────────────────
    let config = JsonConfigFile::new(&cli.config);
    config.ensure_exists().map_err(Error::from)?;
    let settings = config.load().map_err(Error::from)?;

    // ── 2. Storage backend ────────────────────────────────────
    match &cli.data_dir {
        Some(dir) => {
            let store = FileStore::open(dir).map_err(Error::from)?;
            info!("production table stored under {}", dir.display());
            run(&cli, settings, store)
        }
        None => {
            info!("no data dir, production table kept in memory");
            run(&cli, settings, MemoryStore::new())
        }
    }
}

fn run<S: StoragePort>(cli: &Cli, settings: Settings, storage: S) -> Result<()> {
    let model = PlantModel {
        draw_lpm: cli.draw_lpm,
        ..PlantModel::default()
    };
    let mut plant = SimulatedPlant::new(model, &settings);
    plant.set_selector(cli.mode.into());
    plant.set_level_liters(cli.level);

    let mut app = AppService::new(settings, storage);
    let mut sink = LogEventSink::new();

    if cli.realtime {
        let clock = SystemClock::new();
        let period = Duration::from_millis(cli.cycle_ms);
        drive(cli, &settings, &clock, &mut app, &mut plant, &mut sink, || {
            std::thread::sleep(period);
        });
    } else {
        let clock = ManualClock::with_wall_clock(0, SystemClock::new().wall_clock_secs());
        drive(cli, &settings, &clock, &mut app, &mut plant, &mut sink, || {
            clock.advance_ms(cli.cycle_ms);
        });
    }

    info!(
        "finished after {} cycles in {}, {:.2} L in container",
        app.tick_count(),
        app.process_state().name(),
        plant.level_liters()
    );
    println!("{}", serde_json::to_string_pretty(&app.status())?);
    println!("{}", app.history().table_json()?);
    Ok(())
}

/// The control loop: advance the plant, then run one cycle.
fn drive<S: StoragePort>(
    cli: &Cli,
    settings: &Settings,
    clock: &impl ClockPort,
    app: &mut AppService<S>,
    plant: &mut SimulatedPlant,
    sink: &mut LogEventSink,
    mut wait: impl FnMut(),
) {
    plant.advance(clock.now_ms());
    app.start(clock, plant, sink);
    if cli.start {
        app.handle_command(AppCommand::Start, sink);
    }
    for _ in 0..cli.cycles {
        wait();
        plant.advance(clock.now_ms());
        app.tick(settings, clock, plant, sink);
    }
}
