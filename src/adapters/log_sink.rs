//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the `log` facade (the simulator routes it to stderr via `env_logger`).
//! A UI push channel or MQTT adapter would implement the same trait.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::error::Severity;

/// Adapter that logs every [`AppEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Status(s) => {
                info!(
                    "STATUS | {}{} | TDS={:.1}ppm | {:.2} L @ {:.2} L/min | mode={} | \
                     runtime={}s | left={} | faults=0b{:08b}",
                    s.state,
                    s.reason.map(|r| format!(" ({r})")).unwrap_or_default(),
                    s.quality_ppm,
                    s.liters,
                    s.flow_lpm,
                    s.mode,
                    s.runtime_secs,
                    match (s.remaining_liters, s.remaining_secs) {
                        (Some(l), Some(t)) => format!("{l:.1} L / {t}s"),
                        (Some(l), None) => format!("{l:.1} L"),
                        (None, Some(t)) => format!("{t}s"),
                        (None, None) => "-".into(),
                    },
                    s.fault_flags,
                );
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {} -> {}", from, to);
            }
            AppEvent::FaultDetected { flags, reason } => {
                warn!("FAULT | {} (flags=0b{:08b})", reason, flags);
            }
            AppEvent::RunStarted { mode } => {
                info!("RUN | started, mode={}", mode);
            }
            AppEvent::RunEnded { reason, liters } => {
                if reason.severity() == Severity::Fatal {
                    warn!("RUN | ended: {} after {:.2} L", reason, liters);
                } else {
                    info!("RUN | ended: {} after {:.2} L", reason, liters);
                }
            }
            AppEvent::TableChanged => {
                info!("TABLE | production table changed");
            }
            AppEvent::HistoryUpdated(res) => {
                log::trace!("HISTORY | {:?} tier updated", res);
            }
            AppEvent::Started(state) => {
                info!("START | initial_state={}", state);
            }
        }
    }
}
