//! Safety interlock.
//!
//! The interlock runs **every cycle before the FSM** and builds a fault
//! bitmask from the latest snapshot.  The service forces `Error` with the
//! highest-priority fault's reason when the mask is non-zero.
//!
//! ## Checks
//!
//! 1. **Hard fault**: the external fault line is asserted.
//! 2. **Afterflow**: the inlet meter keeps counting while the inlet valve
//!    has been commanded closed for longer than the grace period (a valve
//!    that does not seal).
//! 3. **Flow ratio**: once enough feed water has passed and the state
//!    has settled, product/feed below the minimum means a fouled or torn
//!    membrane.
//!
//! Checks 2 and 3 are individually switchable in [`Settings`].  Faults are
//! re-evaluated every cycle; the latching lives in the `Error` state.

use crate::config::Settings;
use crate::error::SafetyFault;
use crate::fsm::context::SensorSnapshot;
use log::{error, info};

/// Run-relative inputs for the ratio check.
#[derive(Debug, Clone, Copy, Default)]
pub struct RatioInputs {
    pub pulses_in: u32,
    pub pulses_out: u32,
    pub ms_in_state: u64,
}

/// Safety interlock.
#[derive(Debug, Default)]
pub struct SafetyInterlock {
    /// Fault bitmask from the last evaluation.
    faults: u8,
    /// Whether the inlet valve is currently commanded open.
    inlet_open: bool,
    /// When the inlet valve was last commanded closed.
    inlet_closed_at_ms: u64,
    /// Raw inlet counter seen by the previous evaluation.
    last_inlet_pulses: Option<u32>,
}

impl SafetyInterlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inform the interlock of the inlet valve command as it is applied.
    pub fn set_inlet_commanded(&mut self, open: bool, now_ms: u64) {
        if self.inlet_open && !open {
            self.inlet_closed_at_ms = now_ms;
        }
        self.inlet_open = open;
    }

    /// Evaluate all safety conditions against the latest snapshot.
    /// Returns the updated fault bitmask.
    pub fn evaluate(
        &mut self,
        snap: &SensorSnapshot,
        ratio: RatioInputs,
        settings: &Settings,
        now_ms: u64,
    ) -> u8 {
        // ── Hard fault line ───────────────────────────────────────
        self.eval_fault(SafetyFault::HardFault, snap.hard_fault);

        // ── Afterflow (inlet closed, meter still moving) ──────────
        let inlet_moved = self
            .last_inlet_pulses
            .is_some_and(|last| last != snap.pulses.inlet);
        self.last_inlet_pulses = Some(snap.pulses.inlet);
        let afterflow = settings.afterflow_check_enabled
            && !self.inlet_open
            && inlet_moved
            && now_ms.saturating_sub(self.inlet_closed_at_ms) > u64::from(settings.afterflow_grace_ms);
        self.eval_fault(SafetyFault::Afterflow, afterflow);

        // ── Product/feed ratio ────────────────────────────────────
        let bad_ratio = settings.ratio_check_enabled
            && ratio.pulses_in > settings.ratio_min_pulses
            && ratio.ms_in_state > u64::from(settings.ratio_min_state_ms)
            && (ratio.pulses_out as f32 / ratio.pulses_in as f32) < settings.min_flow_ratio;
        self.eval_fault(SafetyFault::FlowRatio, bad_ratio);

        self.faults
    }

    /// Current fault bitmask.
    pub fn faults(&self) -> u8 {
        self.faults
    }

    /// True if **any** fault is active.
    pub fn has_faults(&self) -> bool {
        self.faults != 0
    }

    /// Check if a specific fault is active.
    pub fn has_fault(&self, fault: SafetyFault) -> bool {
        self.faults & fault.mask() != 0
    }

    // ── Internal ──────────────────────────────────────────────────

    /// Set or clear a fault bit based on a boolean condition.
    fn eval_fault(&mut self, fault: SafetyFault, condition: bool) {
        if condition {
            if self.faults & fault.mask() == 0 {
                error!("SAFETY FAULT SET: {fault}");
            }
            self.faults |= fault.mask();
        } else {
            if self.faults & fault.mask() != 0 {
                info!("SAFETY FAULT CLEARED: {fault}");
            }
            self.faults &= !fault.mask();
        }
    }
}
