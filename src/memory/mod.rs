//! Memory zones backing the engine's heap and stacks.
//!
//! The engine does not manage memory itself. At creation it asks a
//! [`ZoneAllocator`] for one zone per area (heap, det stack, nondet stack,
//! trail) and receives a `[base, limit)` address range for each. Registers
//! such as `hp` and `sp` hold absolute addresses inside those ranges.
//!
//! Each zone ends in a red zone. Touching an address in the red zone, or past
//! the limit, goes through the zone's fault handler; an unhandled fault is
//! fatal.

mod allocator;
mod zone;


use std::fmt;

pub use allocator::{
    default_fault_handler, FaultHandler, SystemZoneAllocator, ZoneAllocator, ZoneBounds,
    ZoneFault, ZoneRequest,
};
pub use zone::Zone;

/// Errors reported by a zone allocator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneError {
    /// The request itself is malformed (zero size, red zone too large, ...)
    InvalidRequest { zone: String, reason: &'static str },
    /// The allocator has no room left for the requested zone
    Exhausted { zone: String, requested: usize, available: usize },
}

impl fmt::Display for ZoneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequest { zone, reason } => {
                write!(f, "invalid request for zone `{}`: {}", zone, reason)
            }
            Self::Exhausted { zone, requested, available } => write!(
                f,
                "cannot create zone `{}`: requested {} cells, {} available",
                zone, requested, available
            ),
        }
    }
}

impl std::error::Error for ZoneError {}
