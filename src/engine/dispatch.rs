//! Dispatch loops.
//!
//! A dispatch loop runs guest blocks until one of them halts. Two strategies
//! are available:
//!
//! - [`Trampoline`]: the done label is an ordinary block that halts the loop.
//!   With tracing off the loop body is unrolled eight times; with the `Trace`
//!   or `Goto` debug flag on, every block address is recorded in a ring
//!   buffer (and logged, for `Goto`) before it runs.
//! - [`DirectDispatch`]: compares every next address against the done label
//!   and finishes the call itself, never running the done block.
//!
//! Both leave the engine in the same state and are interchangeable at every
//! call boundary.

use std::io;

use tracing::info;

use crate::code::{CodeAddr, Halt, Transfer};
use crate::debug_flags::DebugFlag;

use super::primitives::engine_done;
use super::types::NUM_PREV_LOCATIONS;
use super::Engine;

/// A way of running guest code from an entry point until it halts.
pub trait Dispatch {
    /// Strategy name, for logs and benchmarks
    const NAME: &'static str;

    /// Run guest code starting at `entry`. Returns once a block halts the
    /// loop; by then the shadow registers hold the final register state.
    fn run(eng: &mut Engine, entry: CodeAddr) -> Halt;
}

/// Ring-buffer trampoline; the default strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct Trampoline;

/// Sentinel-checking dispatch.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectDispatch;

#[cfg(not(feature = "direct-dispatch"))]
pub type DefaultDispatch = Trampoline;

#[cfg(feature = "direct-dispatch")]
pub type DefaultDispatch = DirectDispatch;

/// The last [`NUM_PREV_LOCATIONS`] blocks entered by a recording loop.
#[derive(Debug, Clone)]
pub struct PrevLocations {
    slots: [Option<CodeAddr>; NUM_PREV_LOCATIONS],
    next: usize,
}

impl PrevLocations {
    pub fn new() -> Self {
        Self {
            slots: [None; NUM_PREV_LOCATIONS],
            next: 0,
        }
    }

    #[inline]
    pub fn record(&mut self, pc: CodeAddr) {
        self.slots[self.next] = Some(pc);
        self.next = (self.next + 1) % NUM_PREV_LOCATIONS;
    }

    /// Recorded addresses, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = CodeAddr> + '_ {
        let (newer, older) = self.slots.split_at(self.next);
        older.iter().chain(newer).filter_map(|slot| *slot)
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

impl Default for PrevLocations {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the block at `$pc` and move `$pc` to its successor, or return the
/// halt reason from the enclosing function.
macro_rules! step {
    ($eng:expr, $pc:ident) => {
        $pc = match $pc.run($eng) {
            Transfer::Jump(next) => next,
            Transfer::Halt(halt) => return halt,
        }
    };
}

impl Dispatch for Trampoline {
    const NAME: &'static str = "trampoline";

    fn run(eng: &mut Engine, entry: CodeAddr) -> Halt {
        eng.ownership_enter();
        eng.init_registers();
        let mut pc = entry;

        let flags = eng.debug_flags;
        let log_gotos = flags.is_set(DebugFlag::Goto);
        if !(log_gotos || flags.is_set(DebugFlag::Trace)) {
            loop {
                step!(eng, pc);
                step!(eng, pc);
                step!(eng, pc);
                step!(eng, pc);
                step!(eng, pc);
                step!(eng, pc);
                step!(eng, pc);
                step!(eng, pc);
            }
        }

        loop {
            eng.prev_locations.record(pc);
            if log_gotos {
                info!(target: "nondet_vm::dispatch", label = %pc, "goto");
            }
            step!(eng, pc);
        }
    }
}

impl Dispatch for DirectDispatch {
    const NAME: &'static str = "direct";

    fn run(eng: &mut Engine, entry: CodeAddr) -> Halt {
        eng.ownership_enter();
        eng.init_registers();
        let done = engine_done();
        let mut pc = entry;
        loop {
            if pc == done {
                return eng.finish_done();
            }
            step!(eng, pc);
        }
    }
}

impl Engine {
    /// Load the transient registers for a new dispatch loop and point
    /// `succip` at the done label.
    fn init_registers(&mut self) {
        self.restore_transient_registers();
        self.regs.succip = engine_done();
    }

    /// Bookkeeping shared by every way of leaving a dispatch loop.
    pub(crate) fn leave_dispatch(&mut self, halt: Halt) -> Halt {
        self.ownership_exit();
        self.save_registers();
        halt
    }

    /// Normal end of a call: no exception is pending.
    pub(crate) fn finish_done(&mut self) -> Halt {
        self.exception = None;
        self.leave_dispatch(Halt::Done)
    }

    /// Blocks recorded by the tracing dispatch path, oldest first.
    pub fn prev_locations(&self) -> impl Iterator<Item = CodeAddr> + '_ {
        self.prev_locations.iter()
    }

    /// Write the recorded block addresses to `out`, oldest first, one per
    /// line under a header. Writes nothing if no block was recorded.
    pub fn write_prev_locations<W: io::Write>(&self, out: &mut W) -> io::Result<()> {
        let mut any = false;
        for (i, pc) in self.prev_locations.iter().enumerate() {
            if !any {
                writeln!(out, "previous {} locations:", NUM_PREV_LOCATIONS)?;
                any = true;
            }
            writeln!(out, "{:2}: {}", i, pc)?;
        }
        Ok(())
    }

    /// Log the recorded block addresses, oldest first.
    pub fn dump_prev_locations(&self) {
        let mut any = false;
        for (i, pc) in self.prev_locations.iter().enumerate() {
            if !any {
                info!(target: "nondet_vm::dispatch", "previous {} locations:", NUM_PREV_LOCATIONS);
                any = true;
            }
            info!(target: "nondet_vm::dispatch", "{:2}: {}", i, pc);
        }
    }
}
