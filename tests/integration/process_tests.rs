//! Process sequencing through the full control cycle:
//! requests → interlock → FSM → outputs → production table.

use crate::mock_hw::{MockPlant, Rig, fast_settings};

use osmose::app::commands::AppCommand;
use osmose::app::events::{AppEvent, ProcessState};
use osmose::config::Settings;
use osmose::error::StopReason;
use osmose::fsm::StateId;
use osmose::fsm::context::ActuatorCommands;

/// Manual rig already in `Production`.
fn producing(settings: Settings) -> Rig {
    let mut rig = Rig::new(settings, MockPlant::manual());
    rig.command(AppCommand::Start);
    rig.step(100);
    assert_eq!(rig.state(), StateId::Production);
    rig
}

// ── Scenario A: manual volume limit is a clean stop ───────────

#[test]
fn manual_volume_limit_ends_run_cleanly() {
    let settings = Settings {
        pulses_per_liter_out: 100.0,
        max_volume_manual_liters: 1.0,
        ..fast_settings()
    };
    let mut rig = producing(settings);

    rig.hw.feed(300, 150);
    rig.step(100);
    assert_eq!(rig.state(), StateId::PostFlush);
    assert_eq!(rig.hw.outputs, ActuatorCommands::flush());

    rig.run(11, 100);
    assert_eq!(rig.state(), StateId::Idle);
    assert_eq!(rig.hw.outputs, ActuatorCommands::all_off());
    assert!(!rig.sink.visited().contains(&StateId::Error));
    assert_eq!(rig.app.last_stop_reason(), Some(StopReason::VolumeLimit));
    assert!((rig.app.liters_produced() - 1.5).abs() < 1e-4);

    let row = &rig.app.history().table()[0];
    assert_eq!(row.reason.as_str(), "Volume limit");
    assert!((row.liters - 1.5).abs() < 1e-4);
    assert!(!row.is_open());
}

// ── Scenario B: quality above the hard maximum ────────────────

#[test]
fn quality_above_max_is_fatal() {
    let mut rig = producing(fast_settings());
    rig.hw.feed(100, 50);
    rig.hw.snap.quality_ppm = 35.0;
    rig.step(100);

    assert_eq!(
        rig.app.process_state(),
        ProcessState::Error(StopReason::QualityTooHigh)
    );
    assert_eq!(rig.hw.outputs, ActuatorCommands::all_off());
    assert_eq!(rig.hw.lamps, (false, true));

    let row = &rig.app.history().table()[0];
    assert_eq!(row.reason.as_str(), "TDS too high");
    assert!(rig.app.history().open_row().is_none());
}

// ── Scenario C: container full in automatic mode ──────────────

#[test]
fn container_full_ends_auto_run_without_error() {
    let mut rig = Rig::new(fast_settings(), MockPlant::auto());
    rig.step(100);
    assert_eq!(rig.state(), StateId::Prepare);
    rig.step(100);
    assert_eq!(rig.state(), StateId::Production);

    rig.hw.feed(200, 100);
    rig.hw.set_floats(true, true);
    rig.step(100);
    assert_eq!(rig.state(), StateId::PostFlush);

    rig.run(20, 100);
    assert_eq!(rig.state(), StateId::Idle);
    assert!(!rig.sink.visited().contains(&StateId::Error));
    assert!(!rig.app.auto_blocked());
    assert_eq!(
        rig.app.history().table()[0].reason.as_str(),
        "Container full"
    );
}

#[test]
fn auto_restarts_once_container_drains() {
    let mut rig = Rig::new(fast_settings(), MockPlant::auto());
    rig.hw.set_floats(true, true);
    rig.run(5, 100);
    assert_eq!(rig.state(), StateId::Idle);

    rig.hw.set_floats(false, false);
    rig.step(100);
    assert_eq!(rig.state(), StateId::Prepare);
}

// ── Scenario D: flush never reaches the quality limit ─────────

#[test]
fn flush_timeout_is_fatal_and_leaves_no_row() {
    let settings = Settings {
        auto_flush_enabled: true,
        max_flush_time_secs: 2,
        ..fast_settings()
    };
    let mut rig = Rig::new(settings, MockPlant::manual());
    rig.hw.snap.quality_ppm = 20.0;
    rig.command(AppCommand::Start);
    rig.step(100);
    assert_eq!(rig.state(), StateId::AutoFlush);
    assert_eq!(rig.hw.outputs, ActuatorCommands::flush());

    rig.run(20, 100);
    assert_eq!(rig.state(), StateId::AutoFlush);
    rig.step(100);
    assert_eq!(
        rig.app.process_state(),
        ProcessState::Error(StopReason::FlushTimeout)
    );
    assert!(rig.app.history().table().is_empty());
    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::RunStarted { .. })), 0);
}

#[test]
fn good_quality_ends_flush_and_starts_run() {
    let settings = Settings {
        auto_flush_enabled: true,
        ..fast_settings()
    };
    let mut rig = Rig::new(settings, MockPlant::manual());
    rig.hw.snap.quality_ppm = 20.0;
    rig.command(AppCommand::Start);
    rig.step(100);
    rig.run(5, 100);
    assert_eq!(rig.state(), StateId::AutoFlush);

    rig.hw.snap.quality_ppm = 9.0;
    rig.step(100);
    assert_eq!(rig.state(), StateId::Production);
    assert_eq!(rig.hw.outputs, ActuatorCommands::produce());
    assert!(rig.app.history().open_row().is_some());
}

// ── Interlocks ────────────────────────────────────────────────

#[test]
fn hard_fault_closes_row_and_latches_error() {
    let mut rig = producing(fast_settings());
    rig.hw.feed(100, 50);
    rig.step(100);
    rig.hw.snap.hard_fault = true;
    rig.step(100);

    assert_eq!(
        rig.app.process_state(),
        ProcessState::Error(StopReason::WaterError)
    );
    assert_eq!(
        rig.sink.count(|e| matches!(
            e,
            AppEvent::FaultDetected { reason: StopReason::WaterError, .. }
        )),
        1
    );
    assert_eq!(rig.app.history().table()[0].reason.as_str(), "Water error");

    // the line clearing does not clear the error
    rig.hw.snap.hard_fault = false;
    rig.run(5, 100);
    assert_eq!(rig.state(), StateId::Error);
}

#[test]
fn afterflow_outside_grace_is_fatal() {
    let mut rig = Rig::new(fast_settings(), MockPlant::manual());
    rig.step(100);
    rig.hw.feed(20, 0);
    rig.step(1_000);
    assert_eq!(
        rig.app.process_state(),
        ProcessState::Error(StopReason::FlowWhileClosed)
    );
}

#[test]
fn afterflow_inside_grace_is_tolerated() {
    let settings = Settings {
        post_flush_enabled: false,
        ..fast_settings()
    };
    let mut rig = producing(settings);
    rig.command(AppCommand::Stop);
    rig.step(100);
    assert_eq!(rig.state(), StateId::Idle);

    rig.hw.feed(5, 0);
    rig.step(100);
    assert_eq!(rig.state(), StateId::Idle);

    rig.hw.feed(5, 0);
    rig.step(1_000);
    assert_eq!(rig.state(), StateId::Error);
}

#[test]
fn afterflow_grace_counts_from_valve_closing() {
    let settings = Settings {
        post_flush_enabled: false,
        ..fast_settings()
    };
    let mut rig = producing(settings);
    rig.command(AppCommand::Stop);
    rig.step(400);
    assert_eq!(rig.state(), StateId::Idle);
    assert!(!rig.hw.outputs.inlet);

    // 400 ms after closing: coasting
    rig.hw.feed(5, 0);
    rig.step(400);
    assert_eq!(rig.state(), StateId::Idle);

    // 800 ms after closing: the valve leaks
    rig.hw.feed(5, 0);
    rig.step(400);
    assert_eq!(
        rig.app.process_state(),
        ProcessState::Error(StopReason::FlowWhileClosed)
    );
}

#[test]
fn afterflow_check_can_be_disabled() {
    let settings = Settings {
        afterflow_check_enabled: false,
        ..fast_settings()
    };
    let mut rig = Rig::new(settings, MockPlant::manual());
    rig.step(100);
    rig.hw.feed(20, 0);
    rig.step(1_000);
    assert_eq!(rig.state(), StateId::Idle);
}

#[test]
fn low_product_ratio_is_fatal_once_settled() {
    let mut rig = producing(fast_settings());
    for _ in 0..3 {
        rig.hw.feed(200, 20);
        rig.step(1_000);
    }
    assert_eq!(rig.state(), StateId::Production);

    rig.hw.feed(200, 20);
    rig.step(1_000);
    assert_eq!(
        rig.app.process_state(),
        ProcessState::Error(StopReason::BadFlowRatio)
    );
    assert_eq!(rig.app.history().table()[0].reason.as_str(), "Bad flow ratio");
}

#[test]
fn inconsistent_floats_refuse_auto_start() {
    let mut rig = Rig::new(fast_settings(), MockPlant::auto());
    rig.hw.set_floats(false, true);
    rig.step(100);
    assert_eq!(
        rig.app.process_state(),
        ProcessState::Error(StopReason::LevelSensorFault)
    );
}

// ── Limits ────────────────────────────────────────────────────

#[test]
fn manual_runtime_limit_ends_in_info() {
    let settings = Settings {
        max_runtime_manual_secs: 2.0,
        ..fast_settings()
    };
    let mut rig = producing(settings);
    rig.run(20, 100);
    assert_eq!(rig.state(), StateId::Production);
    rig.step(100);
    assert_eq!(rig.state(), StateId::PostFlush);

    rig.run(10, 100);
    assert_eq!(
        rig.app.process_state(),
        ProcessState::Info(StopReason::MaxRuntime)
    );
    assert_eq!(rig.hw.outputs, ActuatorCommands::all_off());
    assert_eq!(
        rig.app.history().table()[0].reason.as_str(),
        "Max runtime reached"
    );

    // a new start is accepted from Info
    rig.command(AppCommand::Start);
    rig.step(100);
    assert_eq!(rig.state(), StateId::Production);
}

#[test]
fn auto_volume_limit_blocks_until_auto_reactivated() {
    let settings = Settings {
        pulses_per_liter_out: 100.0,
        max_volume_auto_liters: 1.0,
        ..fast_settings()
    };
    let mut rig = Rig::new(settings, MockPlant::auto());
    rig.run(2, 100);
    assert_eq!(rig.state(), StateId::Production);

    rig.hw.feed(300, 150);
    rig.step(100);
    assert_eq!(
        rig.app.process_state(),
        ProcessState::Error(StopReason::VolumeLimit)
    );
    assert!(rig.app.auto_blocked());

    rig.hw.select(false, false);
    rig.step(100);
    assert_eq!(rig.state(), StateId::Idle);
    assert!(rig.app.auto_blocked());

    rig.hw.select(true, false);
    rig.step(100);
    assert!(!rig.app.auto_blocked());
    assert_eq!(rig.state(), StateId::Prepare);
}

// ── Operator requests and selector ────────────────────────────

#[test]
fn stop_request_goes_through_post_flush() {
    let mut rig = producing(fast_settings());
    rig.hw.feed(100, 50);
    rig.step(100);
    rig.command(AppCommand::Stop);
    rig.step(100);
    assert_eq!(rig.state(), StateId::PostFlush);
    assert!(!rig.app.auto_blocked());

    rig.run(11, 100);
    assert_eq!(rig.state(), StateId::Idle);
    assert_eq!(rig.app.history().table()[0].reason.as_str(), "Stopped");
}

#[test]
fn stop_in_auto_mode_blocks_restart() {
    let mut rig = Rig::new(fast_settings(), MockPlant::auto());
    rig.run(2, 100);
    assert_eq!(rig.state(), StateId::Production);

    rig.command(AppCommand::Stop);
    rig.step(100);
    assert!(rig.app.auto_blocked());
    rig.run(30, 100);
    assert_eq!(rig.state(), StateId::Idle);
}

#[test]
fn selector_off_stops_everything() {
    let mut rig = producing(fast_settings());
    rig.hw.feed(100, 50);
    rig.step(100);
    rig.hw.select(false, false);
    rig.step(100);

    assert_eq!(rig.state(), StateId::Idle);
    assert_eq!(rig.hw.outputs, ActuatorCommands::all_off());
    assert_eq!(rig.app.history().table()[0].reason.as_str(), "Stopped");

    // start requests are ignored while off
    rig.command(AppCommand::Start);
    rig.step(100);
    assert_eq!(rig.state(), StateId::Idle);
}

#[test]
fn selector_off_clears_error() {
    let mut rig = producing(fast_settings());
    rig.hw.snap.hard_fault = true;
    rig.step(100);
    assert_eq!(rig.state(), StateId::Error);

    rig.hw.snap.hard_fault = false;
    rig.hw.select(false, false);
    rig.step(100);
    assert_eq!(rig.app.process_state(), ProcessState::Idle);
}

#[test]
fn manual_switch_edge_starts_a_run() {
    let mut rig = Rig::new(fast_settings(), MockPlant::default());
    rig.step(100);
    assert_eq!(rig.state(), StateId::Idle);

    rig.hw.select(false, true);
    rig.step(100);
    assert_eq!(rig.state(), StateId::Prepare);
    rig.step(100);
    assert_eq!(rig.state(), StateId::Production);
    assert_eq!(
        rig.sink.count(|e| matches!(e, AppEvent::RunStarted { .. })),
        1
    );
}

// ── Maintenance ───────────────────────────────────────────────

#[test]
fn service_flush_after_idle_interval() {
    let settings = Settings {
        service_flush_enabled: true,
        service_flush_interval_secs: 5,
        service_flush_time_secs: 2,
        ..fast_settings()
    };
    let mut rig = Rig::new(settings, MockPlant::manual());
    rig.run(4, 1_000);
    assert_eq!(rig.state(), StateId::Idle);
    rig.step(1_000);
    assert_eq!(rig.state(), StateId::ServiceFlush);
    assert_eq!(rig.hw.outputs, ActuatorCommands::flush());

    rig.run(2, 1_000);
    assert_eq!(rig.state(), StateId::Idle);
    rig.run(4, 1_000);
    assert_eq!(rig.state(), StateId::Idle);
}

fn service_flush_settings() -> Settings {
    Settings {
        service_flush_enabled: true,
        service_flush_interval_secs: 5,
        service_flush_time_secs: 60,
        ..fast_settings()
    }
}

#[test]
fn stop_request_ends_service_flush() {
    let mut rig = Rig::new(service_flush_settings(), MockPlant::manual());
    rig.run(5, 1_000);
    assert_eq!(rig.state(), StateId::ServiceFlush);

    rig.command(AppCommand::Stop);
    rig.step(100);
    assert_eq!(rig.state(), StateId::Idle);
    assert_eq!(rig.hw.outputs, ActuatorCommands::all_off());

    // the idle period starts over from the stop
    rig.run(4, 1_000);
    assert_eq!(rig.state(), StateId::Idle);
    rig.step(1_000);
    assert_eq!(rig.state(), StateId::ServiceFlush);
}

#[test]
fn stop_from_info_with_flush_due_goes_idle() {
    let settings = Settings {
        max_runtime_manual_secs: 2.0,
        ..service_flush_settings()
    };
    let mut rig = producing(settings);
    rig.run(21, 100);
    assert_eq!(rig.state(), StateId::PostFlush);
    rig.run(10, 100);
    assert_eq!(
        rig.app.process_state(),
        ProcessState::Info(StopReason::MaxRuntime)
    );

    // the service flush interval has run out by the time the stop lands
    rig.command(AppCommand::Stop);
    rig.step(10_000);
    assert_eq!(rig.state(), StateId::Idle);
    assert_eq!(rig.hw.outputs, ActuatorCommands::all_off());
    assert!(!rig.sink.visited().contains(&StateId::ServiceFlush));
}

// ── Outbound status ───────────────────────────────────────────

#[test]
fn status_published_periodically() {
    let mut rig = Rig::new(fast_settings(), MockPlant::manual());
    rig.run(25, 1_000);
    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::Status(_))), 3);
}

#[test]
fn status_published_on_state_change() {
    let mut rig = Rig::new(fast_settings(), MockPlant::manual());
    rig.step(100);
    let before = rig.sink.count(|e| matches!(e, AppEvent::Status(_)));
    rig.command(AppCommand::Start);
    rig.step(100);
    let after = rig.sink.count(|e| matches!(e, AppEvent::Status(_)));
    assert_eq!(after, before + 1);
}
