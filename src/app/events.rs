//! Outbound application events.
//!
//! The [`AppService`](super::service::AppService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: log to serial, push to a UI socket,
//! publish over MQTT, etc.

use serde::Serialize;

use crate::config::ProductionMode;
use crate::error::StopReason;
use crate::fsm::StateId;
use crate::history::Resolution;

/// Structured events emitted by the application core.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// The application service has started (carries initial state).
    Started(StateId),

    /// The FSM transitioned between states.
    StateChanged { from: StateId, to: StateId },

    /// The safety interlock forced `Error`.
    FaultDetected { flags: u8, reason: StopReason },

    /// A production run began; a new open row is at the top of the table.
    RunStarted { mode: ProductionMode },

    /// A production run was finalized in the table.
    RunEnded { reason: StopReason, liters: f32 },

    /// The production table changed (start, end or clear).
    TableChanged,

    /// New points were appended up to (and including) this tier.
    HistoryUpdated(Resolution),

    /// Periodic status snapshot.
    Status(ProcessStatus),
}

/// Externally visible process state.  `Info` and `Error` carry their reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Idle,
    Prepare,
    AutoFlush,
    Production,
    PostFlush,
    ServiceFlush,
    Info(StopReason),
    Error(StopReason),
}

impl ProcessState {
    /// Combine the FSM state with the context's stop reason.
    pub fn from_parts(state: StateId, reason: Option<StopReason>) -> Self {
        match state {
            StateId::Idle => Self::Idle,
            StateId::Prepare => Self::Prepare,
            StateId::AutoFlush => Self::AutoFlush,
            StateId::Production => Self::Production,
            StateId::PostFlush => Self::PostFlush,
            StateId::ServiceFlush => Self::ServiceFlush,
            StateId::Info => Self::Info(reason.unwrap_or(StopReason::Stopped)),
            StateId::Error => Self::Error(reason.unwrap_or(StopReason::Stopped)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => StateId::Idle.name(),
            Self::Prepare => StateId::Prepare.name(),
            Self::AutoFlush => StateId::AutoFlush.name(),
            Self::Production => StateId::Production.name(),
            Self::PostFlush => StateId::PostFlush.name(),
            Self::ServiceFlush => StateId::ServiceFlush.name(),
            Self::Info(_) => StateId::Info.name(),
            Self::Error(_) => StateId::Error.name(),
        }
    }

    pub fn reason(&self) -> Option<StopReason> {
        match self {
            Self::Info(r) | Self::Error(r) => Some(*r),
            _ => None,
        }
    }
}

/// A point-in-time status snapshot for a UI or telemetry consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStatus {
    pub state: &'static str,
    /// Reason of `Info`/`Error`, `None` otherwise.
    pub reason: Option<&'static str>,
    pub quality_ppm: f32,
    /// Litres of the current (live) or last (frozen) run.
    pub liters: f32,
    pub flow_lpm: f32,
    /// `None` when the limit is disabled or no run is active.
    pub remaining_liters: Option<f32>,
    pub remaining_secs: Option<u32>,
    pub mode: ProductionMode,
    /// Seconds spent in `Production` by the current run.
    pub runtime_secs: u32,
    pub fault_flags: u8,
    /// Product litres of all runs finished since boot.
    pub total_liters_out: f32,
    /// Feed litres of all runs finished since boot.
    pub total_liters_in: f32,
}
