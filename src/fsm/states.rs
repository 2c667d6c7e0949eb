//! Concrete state handler functions and table builder.
//!
//! Each state is defined by plain `fn` pointers: no closures, no
//! dynamic dispatch, no heap.
//!
//! ```text
//!  IDLE ──[start]──▶ PREPARE ──[prepare time]──▶ AUTOFLUSH ──[quality ok]──▶ PRODUCTION
//!   ▲  ▲                 │                          │                          │
//!   │  │                 └──[flush disabled]────────┼─────────────────────────▶│
//!   │  │                                   [flush timeout]                     │
//!   │  │                                            ▼                          │
//!   │  │                                          ERROR ◀──[quality / auto limit]
//!   │  └───────────[post flush time]──── POSTFLUSH ◀──[full / manual limit]────┘
//!   │                                        │
//!   │                                [runtime timeout]──▶ INFO
//!   └──[interval done]── SERVICEFLUSH ◀──[idle interval]── IDLE / INFO
//! ```
//!
//! Interlock faults, operator requests and the selector "off" position
//! are handled by the service with `force_transition`, before the table
//! is ticked.

use super::context::{ActuatorCommands, RunContext, RunEvent};
use super::{StateDescriptor, StateId};
use crate::accounting::{self, LimitBreach};
use crate::config::ProductionMode;
use crate::error::StopReason;
use log::{info, warn};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        // Index 0: Idle
        StateDescriptor {
            id: StateId::Idle,
            name: "Idle",
            on_enter: Some(idle_enter),
            on_exit: None,
            on_update: idle_update,
        },
        // Index 1: Prepare
        StateDescriptor {
            id: StateId::Prepare,
            name: "Prepare",
            on_enter: Some(prepare_enter),
            on_exit: None,
            on_update: prepare_update,
        },
        // Index 2: AutoFlush
        StateDescriptor {
            id: StateId::AutoFlush,
            name: "AutoFlush",
            on_enter: Some(auto_flush_enter),
            on_exit: None,
            on_update: auto_flush_update,
        },
        // Index 3: Production
        StateDescriptor {
            id: StateId::Production,
            name: "Production",
            on_enter: Some(production_enter),
            on_exit: Some(production_exit),
            on_update: production_update,
        },
        // Index 4: PostFlush
        StateDescriptor {
            id: StateId::PostFlush,
            name: "PostFlush",
            on_enter: Some(post_flush_enter),
            on_exit: None,
            on_update: post_flush_update,
        },
        // Index 5: ServiceFlush
        StateDescriptor {
            id: StateId::ServiceFlush,
            name: "ServiceFlush",
            on_enter: Some(service_flush_enter),
            on_exit: None,
            on_update: service_flush_update,
        },
        // Index 6: Info
        StateDescriptor {
            id: StateId::Info,
            name: "Info",
            on_enter: Some(info_enter),
            on_exit: None,
            on_update: info_update,
        },
        // Index 7: Error
        StateDescriptor {
            id: StateId::Error,
            name: "Error",
            on_enter: Some(error_enter),
            on_exit: None,
            on_update: error_update,
        },
    ]
}

// ── Shared helpers ────────────────────────────────────────────

fn secs_to_ms(secs: u32) -> u64 {
    u64::from(secs) * 1000
}

/// Where a clean end of production goes.
pub(crate) fn after_production(ctx: &RunContext) -> StateId {
    if ctx.settings.post_flush_enabled {
        StateId::PostFlush
    } else {
        StateId::Idle
    }
}

fn service_flush_due(ctx: &RunContext) -> bool {
    let s = &ctx.settings;
    s.service_flush_enabled
        && s.service_flush_interval_secs > 0
        && ctx.now_ms.saturating_sub(ctx.idle_since_ms) >= secs_to_ms(s.service_flush_interval_secs)
}

// ═══════════════════════════════════════════════════════════════════════════
//  IDLE state: waiting for a start condition
// ═══════════════════════════════════════════════════════════════════════════

fn idle_enter(ctx: &mut RunContext) {
    ctx.commands = ActuatorCommands::all_off();
    ctx.close_run();
    ctx.rebase_counters();
    ctx.reason = None;
    ctx.runtime_timeout = false;
    ctx.info_pending = false;
    info!("IDLE: outputs off, waiting for start");
}

fn idle_update(ctx: &mut RunContext) -> Option<StateId> {
    // Manual start edge latched by the service
    if ctx.start_latched && ctx.sensors.manual_selected {
        return Some(StateId::Prepare);
    }

    // Automatic start: container not full and not blocked by a limit
    if ctx.sensors.auto_selected && !ctx.sensors.manual_selected && !ctx.auto_blocked {
        if ctx.sensors.levels_inconsistent() {
            warn!("IDLE: upper float wet with lower float dry");
            ctx.reason = Some(StopReason::LevelSensorFault);
            return Some(StateId::Error);
        }
        if !ctx.sensors.level_low_wet && !ctx.sensors.level_high_wet {
            info!("IDLE: container low, automatic start");
            return Some(StateId::Prepare);
        }
    }

    if service_flush_due(ctx) {
        return Some(StateId::ServiceFlush);
    }

    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  PREPARE state: pressurising the membrane
// ═══════════════════════════════════════════════════════════════════════════

fn prepare_enter(ctx: &mut RunContext) {
    ctx.commands = ActuatorCommands::prepare();
    ctx.rebase_counters();
    ctx.final_liters = 0.0;
    ctx.run_mode = ctx.selected_mode();
    ctx.start_latched = false;
    ctx.reason = None;
    ctx.runtime_timeout = false;
    ctx.info_pending = false;
    info!(
        "PREPARE: {} run, holding {}s",
        ctx.run_mode, ctx.settings.prepare_time_secs
    );
}

fn prepare_update(ctx: &mut RunContext) -> Option<StateId> {
    if ctx.ms_in_state() < secs_to_ms(ctx.settings.prepare_time_secs) {
        return None;
    }
    if ctx.settings.auto_flush_enabled {
        Some(StateId::AutoFlush)
    } else {
        Some(StateId::Production)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  AUTOFLUSH state: flushing to drain until quality is good
// ═══════════════════════════════════════════════════════════════════════════

fn auto_flush_enter(ctx: &mut RunContext) {
    ctx.commands = ActuatorCommands::flush();
    info!(
        "AUTOFLUSH: flushing until quality < {:.1} ppm (max {}s)",
        ctx.settings.quality_limit_ppm, ctx.settings.max_flush_time_secs
    );
}

fn auto_flush_update(ctx: &mut RunContext) -> Option<StateId> {
    if ctx.sensors.quality_ppm < ctx.settings.quality_limit_ppm {
        info!(
            "AUTOFLUSH: quality {:.1} ppm after {}ms",
            ctx.sensors.quality_ppm,
            ctx.ms_in_state()
        );
        return Some(StateId::Production);
    }

    if ctx.ms_in_state() > secs_to_ms(ctx.settings.max_flush_time_secs) {
        warn!(
            "AUTOFLUSH: quality still {:.1} ppm after {}s",
            ctx.sensors.quality_ppm, ctx.settings.max_flush_time_secs
        );
        ctx.reason = Some(StopReason::FlushTimeout);
        return Some(StateId::Error);
    }

    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  PRODUCTION state: filling the product container
// ═══════════════════════════════════════════════════════════════════════════

fn production_enter(ctx: &mut RunContext) {
    ctx.commands = ActuatorCommands::produce();
    ctx.production_start_pulses = ctx.pulses_out;
    ctx.begin_run_stats();
    ctx.in_production = true;
    let event = RunEvent::Started {
        mode: ctx.run_mode,
        at_secs: ctx.wall_secs,
    };
    ctx.push_run_event(event);
    info!("PRODUCTION: {} run started", ctx.run_mode);
}

fn production_exit(ctx: &mut RunContext) {
    ctx.finish_production();
    info!(
        "PRODUCTION: run ended after {:.2} L ({})",
        ctx.final_liters,
        ctx.last_stop_reason.unwrap_or(StopReason::Stopped)
    );
}

fn production_update(ctx: &mut RunContext) -> Option<StateId> {
    let mode = ctx.run_mode;
    ctx.update_run_stats();

    // (a) container full: normal end of an automatic run
    if mode == ProductionMode::Auto && ctx.sensors.container_full() {
        ctx.reason = Some(StopReason::ContainerFull);
        return Some(after_production(ctx));
    }

    // (b) quality above the absolute maximum
    if ctx.sensors.quality_ppm > ctx.settings.quality_max_ppm {
        warn!(
            "PRODUCTION: quality {:.1} ppm above max {:.1}",
            ctx.sensors.quality_ppm, ctx.settings.quality_max_ppm
        );
        ctx.reason = Some(StopReason::QualityTooHigh);
        return Some(StateId::Error);
    }

    // (c)/(d) mode limits
    let produced = ctx.liters_produced();
    let breach = accounting::check_limits(produced, ctx.ms_in_state(), mode, &ctx.settings)?;
    match (breach, mode) {
        (LimitBreach::Volume, ProductionMode::Manual) => {
            ctx.reason = Some(StopReason::VolumeLimit);
            Some(after_production(ctx))
        }
        (LimitBreach::Runtime, ProductionMode::Manual) => {
            ctx.reason = Some(StopReason::MaxRuntime);
            ctx.runtime_timeout = true;
            if ctx.settings.post_flush_enabled {
                Some(StateId::PostFlush)
            } else {
                Some(StateId::Info)
            }
        }
        (breach, ProductionMode::Auto) => {
            ctx.reason = Some(match breach {
                LimitBreach::Volume => StopReason::VolumeLimit,
                LimitBreach::Runtime => StopReason::MaxRuntime,
            });
            ctx.auto_blocked = true;
            warn!("PRODUCTION: automatic limit reached, auto mode blocked");
            Some(StateId::Error)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  POSTFLUSH state: rinsing the membrane after a run
// ═══════════════════════════════════════════════════════════════════════════

fn post_flush_enter(ctx: &mut RunContext) {
    ctx.commands = ActuatorCommands::flush();
    ctx.close_run();
    info!("POSTFLUSH: rinsing for {}s", ctx.settings.post_flush_time_secs);
}

fn post_flush_update(ctx: &mut RunContext) -> Option<StateId> {
    if ctx.ms_in_state() < secs_to_ms(ctx.settings.post_flush_time_secs) {
        return None;
    }
    if ctx.runtime_timeout {
        ctx.reason = Some(StopReason::MaxRuntime);
        Some(StateId::Info)
    } else {
        Some(StateId::Idle)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  SERVICEFLUSH state: periodic rinse after a long idle period
// ═══════════════════════════════════════════════════════════════════════════

fn service_flush_enter(ctx: &mut RunContext) {
    ctx.commands = ActuatorCommands::flush();
    info!(
        "SERVICEFLUSH: idle for {}s, rinsing for {}s",
        ctx.now_ms.saturating_sub(ctx.idle_since_ms) / 1000,
        ctx.settings.service_flush_time_secs
    );
}

fn service_flush_update(ctx: &mut RunContext) -> Option<StateId> {
    if ctx.ms_in_state() < secs_to_ms(ctx.settings.service_flush_time_secs) {
        return None;
    }
    ctx.idle_since_ms = ctx.now_ms;
    if ctx.info_pending {
        Some(StateId::Info)
    } else {
        Some(StateId::Idle)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  INFO state: informational stop, waiting for the operator
// ═══════════════════════════════════════════════════════════════════════════

fn info_enter(ctx: &mut RunContext) {
    ctx.commands = ActuatorCommands::all_off();
    ctx.close_run();
    ctx.info_pending = true;
    info!(
        "INFO: {}",
        ctx.reason.map_or("stopped", StopReason::as_str)
    );
}

fn info_update(ctx: &mut RunContext) -> Option<StateId> {
    if ctx.edges.auto_rising || ctx.start_latched {
        return Some(StateId::Idle);
    }
    if service_flush_due(ctx) {
        return Some(StateId::ServiceFlush);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  ERROR state: fatal stop, all outputs off until operator action
// ═══════════════════════════════════════════════════════════════════════════

fn error_enter(ctx: &mut RunContext) {
    ctx.commands = ActuatorCommands::all_off();
    ctx.close_run();
    warn!(
        "ERROR: all outputs off: {}",
        ctx.reason.map_or("unknown", StopReason::as_str)
    );
}

fn error_update(ctx: &mut RunContext) -> Option<StateId> {
    // A fresh automatic activation or a manual start edge clears the error.
    if ctx.edges.auto_rising || ctx.start_latched {
        info!("ERROR: cleared by operator");
        return Some(StateId::Idle);
    }
    None
}
