//! Indicator lamp patterns.
//!
//! Two lamps: **activity** (water moving) and **fault** (error / info).
//! Patterns are pure functions of the monotonic clock, so they stay in
//! phase across cycles without any stored state.
//!
//! | State                               | Activity          | Fault              |
//! |-------------------------------------|-------------------|--------------------|
//! | Production                          | solid             | off                |
//! | Prepare                             | fast blink (60 ms)| off                |
//! | AutoFlush, PostFlush, ServiceFlush  | slow blink (500 ms)| off               |
//! | Info                                | off               | 100 ms pulse / 1 s |
//! | Error                               | off               | solid              |
//! | Idle                                | off               | off                |

use crate::fsm::StateId;

const FAST_BLINK_MS: u64 = 60;
const SLOW_BLINK_MS: u64 = 500;
const INFO_PERIOD_MS: u64 = 1000;
const INFO_ON_MS: u64 = 100;

/// Pattern identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Off,
    Solid,
    FastBlink,
    SlowBlink,
    /// Short flash once per second.
    InfoPulse,
}

impl Pattern {
    /// Lamp level at `now_ms`.
    pub fn level(self, now_ms: u64) -> bool {
        match self {
            Self::Off => false,
            Self::Solid => true,
            Self::FastBlink => (now_ms / FAST_BLINK_MS) % 2 == 1,
            Self::SlowBlink => (now_ms / SLOW_BLINK_MS) % 2 == 1,
            Self::InfoPulse => now_ms % INFO_PERIOD_MS < INFO_ON_MS,
        }
    }
}

/// Patterns of both lamps for one state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorPatterns {
    pub activity: Pattern,
    pub fault: Pattern,
}

impl IndicatorPatterns {
    pub const fn for_state(state: StateId) -> Self {
        let (activity, fault) = match state {
            StateId::Production => (Pattern::Solid, Pattern::Off),
            StateId::Prepare => (Pattern::FastBlink, Pattern::Off),
            StateId::AutoFlush | StateId::PostFlush | StateId::ServiceFlush => {
                (Pattern::SlowBlink, Pattern::Off)
            }
            StateId::Info => (Pattern::Off, Pattern::InfoPulse),
            StateId::Error => (Pattern::Off, Pattern::Solid),
            StateId::Idle => (Pattern::Off, Pattern::Off),
        };
        Self { activity, fault }
    }

    /// `(activity, fault)` lamp levels at `now_ms`.
    pub fn levels(&self, now_ms: u64) -> (bool, bool) {
        (self.activity.level(now_ms), self.fault.level(now_ms))
    }
}
