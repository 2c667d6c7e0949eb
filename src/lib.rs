//! Osmose controller library.
//!
//! Exposes the process core (FSM, safety interlock, accounting, history)
//! and its adapters for the simulator binary and integration testing.
//! Nothing in the core touches hardware directly; see [`app::ports`].

#![deny(unused_must_use)]

pub mod accounting;
pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod fsm;
pub mod history;
pub mod indicators;
pub mod requests;
pub mod safety;
pub mod sensors;
