//! Type definitions shared across the engine.
//!
//! This module contains:
//! - Word: the machine word stored in registers, heap cells and stack slots
//! - ExceptionValue: the payload of a guest exception
//! - EngineError / EngineResult: recoverable errors from engine setup
//! - fatal: the report-and-abort path for invariant violations

use std::fmt;

use tracing::error;

use crate::config::ConfigError;
use crate::memory::ZoneError;

/// A machine word.
pub type Word = usize;

/// Value of `r1` after a call that found a solution.
pub const TRUE: Word = 1;

/// Value of `r1` after a call that exhausted its choice points.
pub const FALSE: Word = 0;

/// Number of general-purpose argument registers (`r1` to `r32`).
pub const NUM_REAL_REGS: usize = 32;

/// Number of block addresses remembered by the recording dispatch path.
pub const NUM_PREV_LOCATIONS: usize = 40;

/// Payload of an exception thrown by guest code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExceptionValue(Word);

impl ExceptionValue {
    pub fn new(word: Word) -> Self {
        Self(word)
    }

    /// The thrown word (typically the heap address of the exception term).
    pub fn word(self) -> Word {
        self.0
    }
}

impl fmt::Display for ExceptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exception({:#x})", self.0)
    }
}

/// Result of engine setup operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while creating an engine
#[derive(Debug, Clone)]
pub enum EngineError {
    /// A memory zone could not be created
    Zone(ZoneError),
    /// Invalid configuration
    Config(ConfigError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zone(e) => write!(f, "Zone error: {}", e),
            Self::Config(e) => write!(f, "Configuration error: {}", e),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Zone(e) => Some(e),
            Self::Config(e) => Some(e),
        }
    }
}

impl From<ZoneError> for EngineError {
    fn from(e: ZoneError) -> Self {
        Self::Zone(e)
    }
}

impl From<ConfigError> for EngineError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Report an unrecoverable engine condition and abort the current host call
/// chain.
///
/// Reaching this means generated code or the engine itself broke an
/// invariant. The message is logged before panicking so it survives even when
/// the panic is swallowed by a host-level handler.
#[cold]
#[track_caller]
pub fn fatal(msg: impl fmt::Display) -> ! {
    error!(target: "nondet_vm::fatal", "{}", msg);
    panic!("nondet-vm fatal error: {}", msg)
}
