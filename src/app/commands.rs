//! Inbound commands to the application service.
//!
//! These represent actions requested by the outside world (a UI handler,
//! a push button, the simulator CLI) that the
//! [`AppService`](super::service::AppService) interprets and acts upon.

/// Commands that external adapters can send into the application core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppCommand {
    /// Start a run from `Idle`, `Info`, `Error` or `ServiceFlush`.
    /// Taken on the next control cycle.
    Start,

    /// Stop whatever is running.  Taken on the next control cycle.
    Stop,

    /// Drop every row of the production table.
    ClearProductionTable,
}
