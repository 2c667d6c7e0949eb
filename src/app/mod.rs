//! Application core: pure domain logic, zero I/O.
//!
//! This module contains the control cycle of the Osmose controller:
//! FSM orchestration, safety evaluation, production accounting and the
//! history engine wiring.  All interaction with the plant happens through
//! **port traits** defined in [`ports`], keeping this layer fully testable
//! without real peripherals.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
