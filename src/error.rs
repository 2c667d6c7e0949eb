//! Unified error and stop-reason types for the Osmose controller.
//!
//! Two families live here:
//!
//! - **Stop reasons** ([`StopReason`]) explain why a production run or a
//!   process cycle ended.  They are domain values, not errors: they are
//!   recorded verbatim in the production table and surface in the status
//!   view.  Each carries a [`Severity`].
//! - **Errors** ([`Error`]) cover the fallible plumbing around the core
//!   (storage, configuration, hardware I/O).  None of them ever halts the
//!   control cycle.
//!
//! All variants are `Copy` so they pass through the interlock and FSM
//! without allocation.

use core::fmt;

use crate::app::ports::{ConfigError, StorageError};

// ---------------------------------------------------------------------------
// Stop reasons
// ---------------------------------------------------------------------------

/// How a stop reason is handled by the process state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Ordinary end of a run (operator stop, container full, manual volume).
    Normal,
    /// Forces `Info`; cleared by the next valid start.
    Informational,
    /// Forces `Error`; cleared only by an explicit operator action.
    Fatal,
}

/// Why a run or cycle ended.  The `Display` text is what gets persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Default reason: operator stop, selector switched off.
    Stopped,
    /// Produced volume exceeded the mode limit.
    VolumeLimit,
    /// Production runtime exceeded the mode limit.
    MaxRuntime,
    /// Both level floats wet during an automatic run.
    ContainerFull,
    /// Quality probe above the absolute maximum.
    QualityTooHigh,
    /// Quality never dropped below the limit during the flush window.
    FlushTimeout,
    /// External hard-fault input asserted.
    WaterError,
    /// Inlet meter moved while the inlet valve was closed.
    FlowWhileClosed,
    /// Product/feed pulse ratio below the minimum.
    BadFlowRatio,
    /// High float wet while low float dry.
    LevelSensorFault,
}

impl StopReason {
    /// Text recorded in the production table and status view.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::VolumeLimit => "Volume limit",
            Self::MaxRuntime => "Max runtime reached",
            Self::ContainerFull => "Container full",
            Self::QualityTooHigh => "TDS too high",
            Self::FlushTimeout => "Flush timeout",
            Self::WaterError => "Water error",
            Self::FlowWhileClosed => "Flow while valve closed",
            Self::BadFlowRatio => "Bad flow ratio",
            Self::LevelSensorFault => "Level sensor fault",
        }
    }

    /// Default severity of this reason when it ends a run.
    ///
    /// Volume and runtime breaches are mode-dependent: the state handlers
    /// escalate them to `Fatal` for automatic runs.
    pub const fn severity(self) -> Severity {
        match self {
            Self::Stopped | Self::ContainerFull | Self::VolumeLimit => Severity::Normal,
            Self::MaxRuntime => Severity::Informational,
            Self::QualityTooHigh
            | Self::FlushTimeout
            | Self::WaterError
            | Self::FlowWhileClosed
            | Self::BadFlowRatio
            | Self::LevelSensorFault => Severity::Fatal,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Safety faults
// ---------------------------------------------------------------------------

/// Safety faults detected by the interlock layer.  Accumulated in a
/// bitfield so simultaneous conditions are all visible in telemetry; the
/// highest-priority one names the stop reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SafetyFault {
    /// External hard-fault line asserted.
    HardFault = 0b0000_0001,
    /// Inlet meter still counting after the inlet valve closed.
    Afterflow = 0b0000_0010,
    /// Product/feed ratio below the configured minimum.
    FlowRatio = 0b0000_0100,
}

impl SafetyFault {
    /// Evaluation order, highest priority first.
    pub const ALL: [Self; 3] = [Self::HardFault, Self::Afterflow, Self::FlowRatio];

    /// Return the bitmask for this fault.
    pub const fn mask(self) -> u8 {
        self as u8
    }

    /// Stop reason recorded when this fault ends a run.
    pub const fn reason(self) -> StopReason {
        match self {
            Self::HardFault => StopReason::WaterError,
            Self::Afterflow => StopReason::FlowWhileClosed,
            Self::FlowRatio => StopReason::BadFlowRatio,
        }
    }

    /// Highest-priority fault present in `flags`.
    pub fn first_in(flags: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|f| flags & f.mask() != 0)
    }
}

impl fmt::Display for SafetyFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HardFault => write!(f, "hard fault input"),
            Self::Afterflow => write!(f, "afterflow"),
            Self::FlowRatio => write!(f, "flow ratio"),
        }
    }
}

// ---------------------------------------------------------------------------
// Hardware I/O errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoError {
    /// A digital input could not be read.
    InputRead(&'static str),
    /// A digital output could not be driven.
    OutputWrite(&'static str),
    /// The quality probe ADC returned no sample.
    AdcReadFailed,
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InputRead(pin) => write!(f, "input read failed: {pin}"),
            Self::OutputWrite(pin) => write!(f, "output write failed: {pin}"),
            Self::AdcReadFailed => write!(f, "ADC read failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation around the core funnels into this type.
#[derive(Debug)]
pub enum Error {
    Io(IoError),
    Storage(StorageError),
    Config(ConfigError),
    /// A persisted blob could not be encoded or decoded.
    Codec(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Codec(msg) => write!(f, "codec: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<IoError> for Error {
    fn from(e: IoError) -> Self {
        Self::Io(e)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
