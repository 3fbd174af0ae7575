//! Typed storage for one zone.

use std::fmt;
use std::sync::Arc;

use super::allocator::{FaultHandler, ZoneAllocator, ZoneBounds, ZoneFault, ZoneRequest};
use super::ZoneError;
use crate::engine::fatal;

/// Cells of one zone, addressed by absolute address.
///
/// Addresses below the red zone are accessed directly; anything else goes
/// through the fault handler.
pub struct Zone<T> {
    name: String,
    bounds: ZoneBounds,
    redzone_start: usize,
    fault_handler: FaultHandler,
    cells: Vec<T>,
    allocator: Arc<dyn ZoneAllocator>,
}

impl<T: Clone + Default> Zone<T> {
    /// Request a zone from the allocator and back it with default cells.
    pub fn create(
        allocator: &Arc<dyn ZoneAllocator>,
        request: &ZoneRequest<'_>,
    ) -> Result<Self, ZoneError> {
        let bounds = allocator.create_zone(request)?;
        Ok(Self {
            name: request.name.to_string(),
            bounds,
            redzone_start: bounds.limit - request.redzone_size,
            fault_handler: request.fault_handler,
            cells: vec![T::default(); bounds.len()],
            allocator: Arc::clone(allocator),
        })
    }
}

impl<T> Zone<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn base(&self) -> usize {
        self.bounds.base
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.bounds.limit
    }

    pub fn bounds(&self) -> ZoneBounds {
        self.bounds
    }

    /// First address of the red zone.
    pub fn redzone_start(&self) -> usize {
        self.redzone_start
    }

    #[inline]
    fn index(&self, addr: usize) -> usize {
        if addr >= self.bounds.base && addr < self.redzone_start {
            addr - self.bounds.base
        } else {
            self.fault(addr)
        }
    }

    #[cold]
    #[inline(never)]
    fn fault(&self, addr: usize) -> usize {
        let fault = ZoneFault {
            zone: &self.name,
            addr,
            bounds: self.bounds,
            redzone_start: self.redzone_start,
        };
        if (self.fault_handler)(&fault) && self.bounds.contains(addr) {
            addr - self.bounds.base
        } else {
            fatal(format_args!(
                "zone `{}` overflow at {:#x} (zone is [{:#x}, {:#x}))",
                self.name, addr, self.bounds.base, self.bounds.limit
            ))
        }
    }

    /// Check that `addr` may be used, without reading it.
    #[inline]
    pub fn touch(&self, addr: usize) {
        self.index(addr);
    }

    #[inline]
    pub fn get(&self, addr: usize) -> &T {
        let i = self.index(addr);
        &self.cells[i]
    }

    #[inline]
    pub fn get_mut(&mut self, addr: usize) -> &mut T {
        let i = self.index(addr);
        &mut self.cells[i]
    }

    #[inline]
    pub fn set(&mut self, addr: usize, value: T) {
        *self.get_mut(addr) = value;
    }
}

impl<T> fmt::Debug for Zone<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Zone")
            .field("name", &self.name)
            .field("base", &format_args!("{:#x}", self.bounds.base))
            .field("limit", &format_args!("{:#x}", self.bounds.limit))
            .field("redzone_start", &format_args!("{:#x}", self.redzone_start))
            .finish()
    }
}

impl<T> Drop for Zone<T> {
    fn drop(&mut self) {
        self.allocator.destroy_zone(&self.name, self.bounds);
    }
}
