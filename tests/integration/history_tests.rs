//! Production table and time series through the control cycle.

use crate::mock_hw::{MockPlant, RecordingSink, Rig, WALL_START, fast_settings};

use osmose::adapters::file_store::FileStore;
use osmose::adapters::time::ManualClock;
use osmose::app::commands::AppCommand;
use osmose::app::events::AppEvent;
use osmose::app::service::AppService;
use osmose::config::{ProductionMode, Settings};
use osmose::fsm::StateId;
use osmose::history::{Resolution, TABLE_CAPACITY};

fn no_post_flush() -> Settings {
    Settings {
        post_flush_enabled: false,
        ..fast_settings()
    }
}

/// One short manual run: start, produce `product` pulses, stop.
fn short_run(rig: &mut Rig, product: u32) {
    rig.command(AppCommand::Start);
    rig.step(100);
    assert_eq!(rig.state(), StateId::Production);
    rig.hw.feed(product * 2, product);
    rig.step(100);
    rig.command(AppCommand::Stop);
    rig.step(100);
    assert_eq!(rig.state(), StateId::Idle);
}

#[test]
fn run_is_finalized_exactly_once() {
    let mut rig = Rig::new(no_post_flush(), MockPlant::manual());
    short_run(&mut rig, 880);
    rig.run(10, 100);

    let table = rig.app.history().table();
    assert_eq!(table.len(), 1);
    assert_eq!(table[0].mode, ProductionMode::Manual);
    assert!((table[0].liters - 1.0).abs() < 1e-4);
    assert!(table[0].start_ts >= WALL_START);
    assert!(table[0].end_ts >= table[0].start_ts);

    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::RunStarted { .. })), 1);
    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::RunEnded { .. })), 1);
    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::TableChanged)), 2);
}

#[test]
fn row_records_quality_range_and_feed() {
    let mut rig = Rig::new(no_post_flush(), MockPlant::manual());
    rig.command(AppCommand::Start);
    rig.step(100);
    assert_eq!(rig.state(), StateId::Production);
    rig.hw.snap.quality_ppm = 9.0;
    rig.hw.feed(2_150, 880);
    rig.step(100);
    rig.command(AppCommand::Stop);
    rig.step(100);

    let row = &rig.app.history().table()[0];
    assert_eq!(row.quality_min, 5.0);
    assert_eq!(row.quality_max, 9.0);
    assert!((row.quality_avg - 7.0).abs() < 1e-4);
    assert!((row.liters_in - 2.0).abs() < 1e-4);
    assert!((row.liters - 1.0).abs() < 1e-4);
}

#[test]
fn status_sums_finished_runs_since_boot() {
    let mut rig = Rig::new(no_post_flush(), MockPlant::manual());
    assert_eq!(rig.app.status().total_liters_out, 0.0);
    short_run(&mut rig, 880);
    short_run(&mut rig, 440);

    let status = rig.app.status();
    assert!((status.total_liters_out - 1.5).abs() < 1e-4);
    // short_run feeds twice the product pulses at 1075 pulses/L
    assert!((status.total_liters_in - 2_640.0 / 1_075.0).abs() < 1e-3);

    let rebooted = Rig::with_store(no_post_flush(), MockPlant::manual(), rig.store_snapshot());
    assert_eq!(rebooted.app.status().total_liters_out, 0.0);
    assert_eq!(rebooted.app.history().table().len(), 2);
}

#[test]
fn rows_are_newest_first_and_bounded() {
    let mut rig = Rig::new(no_post_flush(), MockPlant::manual());
    for i in 0..(TABLE_CAPACITY as u32 + 5) {
        short_run(&mut rig, i + 1);
    }
    let table = rig.app.history().table();
    assert_eq!(table.len(), TABLE_CAPACITY);
    // newest run produced the most
    assert!(table[0].liters > table[TABLE_CAPACITY - 1].liters);
    assert!(table.windows(2).all(|w| w[0].start_ts >= w[1].start_ts));
}

#[test]
fn table_survives_a_reboot() {
    let mut rig = Rig::new(no_post_flush(), MockPlant::manual());
    short_run(&mut rig, 440);
    short_run(&mut rig, 880);

    let rebooted = Rig::with_store(no_post_flush(), MockPlant::manual(), rig.store_snapshot());
    assert_eq!(rebooted.app.history().table(), rig.app.history().table());
    assert_eq!(rebooted.state(), StateId::Idle);
}

#[test]
fn row_open_at_power_loss_stays_unfinished() {
    let mut rig = Rig::new(no_post_flush(), MockPlant::manual());
    rig.command(AppCommand::Start);
    rig.step(100);
    assert!(rig.app.history().open_row().is_some());

    let mut rebooted =
        Rig::with_store(no_post_flush(), MockPlant::manual(), rig.store_snapshot());
    assert!(rebooted.app.history().open_row().is_none());
    assert!(rebooted.app.history().table()[0].is_open());

    short_run(&mut rebooted, 100);
    let table = rebooted.app.history().table();
    assert_eq!(table.len(), 2);
    assert_eq!(table[0].reason.as_str(), "Stopped");
    assert!(table[1].is_open());
}

#[test]
fn clear_command_empties_and_persists() {
    let mut rig = Rig::new(no_post_flush(), MockPlant::manual());
    short_run(&mut rig, 100);
    rig.command(AppCommand::ClearProductionTable);
    assert!(rig.app.history().table().is_empty());
    assert!(matches!(rig.sink.events.last(), Some(AppEvent::TableChanged)));

    let rebooted = Rig::with_store(no_post_flush(), MockPlant::manual(), rig.store_snapshot());
    assert!(rebooted.app.history().table().is_empty());
}

#[test]
fn file_store_keeps_table_between_processes() {
    let dir = tempfile::tempdir().unwrap();
    let settings = no_post_flush();
    let clock = ManualClock::with_wall_clock(0, WALL_START);
    let mut hw = MockPlant::manual();
    let mut sink = RecordingSink::default();

    {
        let mut app = AppService::new(settings, FileStore::open(dir.path()).unwrap());
        app.start(&clock, &mut hw, &mut sink);
        app.handle_command(AppCommand::Start, &mut sink);
        clock.advance_ms(100);
        app.tick(&settings, &clock, &mut hw, &mut sink);
        hw.feed(1_000, 440);
        clock.advance_ms(100);
        app.tick(&settings, &clock, &mut hw, &mut sink);
        app.handle_command(AppCommand::Stop, &mut sink);
        clock.advance_ms(100);
        app.tick(&settings, &clock, &mut hw, &mut sink);
        assert_eq!(app.history().table().len(), 1);
    }

    let app = AppService::new(settings, FileStore::open(dir.path()).unwrap());
    let table = app.history().table();
    assert_eq!(table.len(), 1);
    assert!((table[0].liters - 0.5).abs() < 1e-4);
    assert_eq!(table[0].reason.as_str(), "Stopped");
}

#[test]
fn series_sampled_on_base_period() {
    let mut rig = Rig::new(fast_settings(), MockPlant::manual());
    rig.run(50, 100);
    let fine = rig.app.history().recent(Resolution::Fine, 100);
    assert_eq!(fine.len(), 3);
    assert!(fine.iter().all(|s| (s.quality_ppm - 5.0).abs() < 1e-4));
    assert_eq!(
        rig.sink.count(|e| matches!(e, AppEvent::HistoryUpdated(_))),
        3
    );
}

#[test]
fn series_volume_tracks_current_run() {
    let mut rig = Rig::new(fast_settings(), MockPlant::manual());
    rig.command(AppCommand::Start);
    rig.step(100);
    for _ in 0..4 {
        rig.hw.feed(440, 220);
        rig.step(1_000);
    }
    let fine = rig.app.history().recent(Resolution::Fine, 100);
    let last = fine.last().unwrap();
    assert!(last.liters > 0.0);
    assert!(last.liters <= rig.app.liters_produced() + 1e-4);
    assert!(last.flow_lpm > 0.0);

    let json = rig.app.history().series_json(Resolution::Fine).unwrap();
    assert!(json.starts_with("{\"tds\":["));
}
