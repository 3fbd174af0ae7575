//! The zone allocator collaborator interface and its default implementation.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, error};

use super::ZoneError;

/// Called when an access lands in a zone's red zone or beyond its limit.
///
/// Returns `true` if the access may proceed. Accesses past the limit never
/// proceed, whatever the handler says.
pub type FaultHandler = fn(&ZoneFault<'_>) -> bool;

/// Description of a faulting zone access.
#[derive(Debug, Clone, Copy)]
pub struct ZoneFault<'a> {
    pub zone: &'a str,
    pub addr: usize,
    pub bounds: ZoneBounds,
    pub redzone_start: usize,
}

impl ZoneFault<'_> {
    /// Whether the faulting address is inside the zone's red zone.
    pub fn in_redzone(&self) -> bool {
        self.addr >= self.redzone_start && self.addr < self.bounds.limit
    }
}

/// The handler zones get unless the caller asks otherwise: every fault is
/// treated as stack or heap exhaustion.
pub fn default_fault_handler(fault: &ZoneFault<'_>) -> bool {
    error!(
        target: "nondet_vm::memory",
        zone = fault.zone,
        addr = fault.addr,
        base = fault.bounds.base,
        limit = fault.bounds.limit,
        "zone overflow"
    );
    false
}

/// A request for a new zone. Sizes are in cells of the zone's element type.
#[derive(Debug, Clone, Copy)]
pub struct ZoneRequest<'a> {
    pub name: &'a str,
    pub alignment: usize,
    pub requested_size: usize,
    pub redzone_size: usize,
    pub fault_handler: FaultHandler,
}

impl<'a> ZoneRequest<'a> {
    pub fn new(name: &'a str, requested_size: usize, redzone_size: usize) -> Self {
        Self {
            name,
            alignment: 1,
            requested_size,
            redzone_size,
            fault_handler: default_fault_handler,
        }
    }

    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_fault_handler(mut self, handler: FaultHandler) -> Self {
        self.fault_handler = handler;
        self
    }

    fn validate(&self) -> Result<(), ZoneError> {
        let reason = if self.requested_size == 0 {
            Some("requested size is zero")
        } else if self.redzone_size >= self.requested_size {
            Some("red zone covers the whole zone")
        } else if !self.alignment.is_power_of_two() {
            Some("alignment is not a power of two")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(ZoneError::InvalidRequest {
                zone: self.name.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

/// Address range `[base, limit)` of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneBounds {
    pub base: usize,
    pub limit: usize,
}

impl ZoneBounds {
    #[inline]
    pub fn len(&self) -> usize {
        self.limit - self.base
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.limit == self.base
    }

    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.base && addr < self.limit
    }
}

/// Source of zone address ranges.
///
/// The engine calls `create_zone` only while an engine or context is being
/// created, and `destroy_zone` when the zone is dropped.
pub trait ZoneAllocator: Send + Sync + fmt::Debug {
    fn create_zone(&self, request: &ZoneRequest<'_>) -> Result<ZoneBounds, ZoneError>;

    fn destroy_zone(&self, _name: &str, _bounds: ZoneBounds) {}
}

/// Gap left between consecutive zones so that an overrun of one zone never
/// produces a valid address in its neighbour.
const ZONE_GAP: usize = 64;

/// First address handed out. Keeps address zero (and its neighbourhood)
/// invalid in every zone.
const FIRST_OFFSET: usize = 0x1000;

/// Default allocator: hands out disjoint address ranges from a single
/// process-wide address space, optionally bounded by a total cell budget.
#[derive(Debug)]
pub struct SystemZoneAllocator {
    next_offset: AtomicUsize,
    live_cells: AtomicUsize,
    budget: Option<usize>,
}

impl SystemZoneAllocator {
    pub fn new() -> Self {
        Self {
            next_offset: AtomicUsize::new(FIRST_OFFSET),
            live_cells: AtomicUsize::new(0),
            budget: None,
        }
    }

    /// An allocator that refuses to keep more than `budget` cells live.
    pub fn with_budget(budget: usize) -> Self {
        Self {
            budget: Some(budget),
            ..Self::new()
        }
    }

    /// Total cells in zones created and not yet destroyed.
    pub fn live_cells(&self) -> usize {
        self.live_cells.load(Ordering::Acquire)
    }
}

impl Default for SystemZoneAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl ZoneAllocator for SystemZoneAllocator {
    fn create_zone(&self, request: &ZoneRequest<'_>) -> Result<ZoneBounds, ZoneError> {
        request.validate()?;

        let size = request.requested_size;
        let reserved = self
            .live_cells
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| match self.budget {
                Some(budget) if live + size > budget => None,
                _ => Some(live + size),
            });
        if let Err(live) = reserved {
            let available = self.budget.map_or(0, |b| b.saturating_sub(live));
            return Err(ZoneError::Exhausted {
                zone: request.name.to_string(),
                requested: size,
                available,
            });
        }

        let align = request.alignment;
        let span = size + align + ZONE_GAP;
        let start = self.next_offset.fetch_add(span, Ordering::AcqRel);
        let base = (start + align - 1) & !(align - 1);
        let bounds = ZoneBounds { base, limit: base + size };

        debug!(
            target: "nondet_vm::memory",
            zone = request.name,
            base = bounds.base,
            limit = bounds.limit,
            redzone = request.redzone_size,
            "created zone"
        );
        Ok(bounds)
    }

    fn destroy_zone(&self, name: &str, bounds: ZoneBounds) {
        self.live_cells.fetch_sub(bounds.len(), Ordering::AcqRel);
        debug!(target: "nondet_vm::memory", zone = name, base = bounds.base, "destroyed zone");
    }
}
