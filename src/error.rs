//! Unified error types for the moisture node firmware.
//!
//! A single `Error` enum that every component handler returns, so the
//! dispatcher can classify failures in one place:
//!
//! | Variant            | Handling at the dispatcher                     |
//! |--------------------|------------------------------------------------|
//! | `CommandRejected`  | logged with operation + code, dispatch goes on |
//! | `Storage`          | logged, dispatch goes on                       |
//! | `Sensor`           | logged, measurement cycle returns to idle      |
//! | `Fatal`            | dispatch aborted, returned to the run loop     |
//!
//! All variants are `Copy` so they travel through handlers without
//! allocation.

use core::fmt;

use crate::app::ports::{CommandError, StorageError, TimerError};
use crate::scheduler::TimerHandle;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible component operation funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The mesh stack refused a command.
    CommandRejected { op: &'static str, code: u16 },
    /// Durable storage failed.
    Storage(StorageError),
    /// The soil sensor could not be read.
    Sensor(SensorError),
    /// Resource exhaustion; needs operator intervention.
    Fatal(FatalError),
}

impl Error {
    /// Attach an operation name to a stack-level command failure.
    pub fn rejected(op: &'static str, err: CommandError) -> Self {
        Self::CommandRejected { op, code: err.0 }
    }

    /// Translate a timer arm failure.  Exhaustion is always fatal.
    pub fn timer(op: &'static str, handle: TimerHandle, err: TimerError) -> Self {
        match err {
            TimerError::Exhausted => Self::Fatal(FatalError {
                op,
                kind: FatalKind::TimerTableFull,
                param: u32::from(handle.0),
            }),
            TimerError::Rejected(code) => Self::CommandRejected { op, code },
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommandRejected { op, code } => {
                write!(f, "{op}: command rejected (0x{code:04X})")
            }
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Fatal(e) => write!(f, "fatal: {e}"),
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// ADC conversion returned an error or timed out.
    AdcReadFailed,
    /// Power rail GPIO could not be driven.
    GpioFailed,
    /// `finish_async_read` called without a preceding power-on.
    NotPowered,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AdcReadFailed => write!(f, "ADC read failed"),
            Self::GpioFailed => write!(f, "GPIO write failed"),
            Self::NotPowered => write!(f, "sensor not powered"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Fatal errors
// ---------------------------------------------------------------------------

/// Resource exhaustion that the node cannot recover from on its own.
///
/// Carries the originating operation and the parameter that could not be
/// satisfied (timer handle, heap slot count) so the condition can be
/// diagnosed from the fatal log after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatalError {
    pub op: &'static str,
    pub kind: FatalKind,
    pub param: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FatalKind {
    /// Every soft timer slot is in use.
    TimerTableFull = 1,
    /// The model library could not allocate its state.
    ModelAllocation = 2,
}

impl fmt::Display for FatalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimerTableFull => write!(f, "soft timer table full"),
            Self::ModelAllocation => write!(f, "model library allocation failed"),
        }
    }
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} during {} (param={})", self.kind, self.op, self.param)
    }
}

impl From<FatalError> for Error {
    fn from(e: FatalError) -> Self {
        Self::Fatal(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
