//! The engine: registers, memory areas and the call boundary.
//!
//! An [`Engine`] owns everything one thread needs to run guest code: the real
//! and shadow register files, the heap, a [`Context`] with the stacks, the
//! boundary stack, profiling state and its own copy of the debug flags.
//!
//! Module layout:
//! - `types`: words, exception values, errors, `fatal`
//! - `registers`: register file and save/restore between its two copies
//! - `context`: det stack, nondet stack and trail of one execution context
//! - `nondet`: nondet frames and fail/redo/succeed
//! - `trail`: undo log and tickets
//! - `exception`: throw and handler frames
//! - `primitives`: the built-in control blocks
//! - `dispatch`: the dispatch loops
//! - `boundary`: entering guest code from the host
//! - `ownership`: context ownership across nested calls
//! - `thread_engine`: one engine per host thread

mod boundary;
mod context;
mod dispatch;
mod exception;
mod nondet;
mod ownership;
mod primitives;
mod registers;
mod thread_engine;
mod trail;
mod types;


use std::sync::Arc;

#[cfg(feature = "thread-safe")]
use std::thread::{self, ThreadId};

use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::debug_flags::{self, DebugFlag, DebugFlags};
use crate::memory::{SystemZoneAllocator, Zone, ZoneAllocator, ZoneRequest};
use crate::profiling::Profiler;

use boundary::ResumePoint;

pub use boundary::GuestUnwind;
pub use context::Context;
pub use dispatch::{DefaultDispatch, DirectDispatch, Dispatch, PrevLocations, Trampoline};
pub use nondet::{BoundaryKind, HandlerInfo, NondetFrame};
pub use primitives::{engine_done, Primitive};
pub use registers::RegisterFile;
pub use thread_engine::{finalize_thread_engine, init_thread_engine, with_thread_engine};
pub use trail::{Ticket, Trail, TrailEntry, UntrailReason};
pub use types::*;

/// One guest execution engine.
#[derive(Debug)]
pub struct Engine {
    regs: RegisterFile,
    fake_regs: RegisterFile,
    heap: Zone<Word>,
    context: Context,
    exception: Option<ExceptionValue>,
    boundaries: Vec<ResumePoint>,
    nondet_floor: Word,
    profiler: Profiler,
    debug_flags: DebugFlags,
    prev_locations: PrevLocations,
    config: EngineConfig,
    allocator: Arc<dyn ZoneAllocator>,
    #[cfg(feature = "thread-safe")]
    owner_thread: ThreadId,
    #[cfg(feature = "thread-safe")]
    c_depth: usize,
    #[cfg(feature = "thread-safe")]
    saved_owners: Vec<Option<ThreadId>>,
}

impl Engine {
    /// Create an engine whose zones come from a fresh [`SystemZoneAllocator`].
    pub fn create(config: EngineConfig) -> EngineResult<Self> {
        Self::create_with_allocator(config, Arc::new(SystemZoneAllocator::new()))
    }

    /// Create an engine whose zones come from `allocator`.
    pub fn create_with_allocator(
        config: EngineConfig,
        allocator: Arc<dyn ZoneAllocator>,
    ) -> EngineResult<Self> {
        config.validate()?;
        let heap = Zone::create(
            &allocator,
            &ZoneRequest::new("heap", config.heap_size, config.heap_redzone)
                .with_alignment(config.zone_alignment),
        )?;
        let context = Context::create(&config, &allocator)?;

        let mut regs = RegisterFile::new(Primitive::NotReached.addr());
        regs.hp = heap.base();
        regs.sp = context.det_stack_base();
        regs.maxfr = context.nondet_bottom();
        regs.curfr = context.nondet_bottom();

        let debug_flags = debug_flags::defaults();
        debug!(
            target: "nondet_vm::engine",
            context = context.name(),
            heap = ?heap.bounds(),
            ?debug_flags,
            "created engine"
        );

        Ok(Self {
            regs,
            fake_regs: regs,
            heap,
            nondet_floor: context.nondet_bottom(),
            context,
            exception: None,
            boundaries: Vec::new(),
            profiler: Profiler::new(config.profile_time, config.profile_calls),
            debug_flags,
            prev_locations: PrevLocations::new(),
            config,
            allocator,
            #[cfg(feature = "thread-safe")]
            owner_thread: thread::current().id(),
            #[cfg(feature = "thread-safe")]
            c_depth: 0,
            #[cfg(feature = "thread-safe")]
            saved_owners: Vec::new(),
        })
    }

    /// Tear the engine down, releasing its context and zones.
    pub fn destroy(self) {
        if !self.boundaries.is_empty() {
            fatal(format_args!(
                "destroying engine with {} active call boundaries",
                self.boundaries.len()
            ));
        }
        let Self { context, heap, .. } = self;
        context.destroy();
        debug!(target: "nondet_vm::engine", heap = ?heap.bounds(), "destroyed engine");
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn allocator(&self) -> &Arc<dyn ZoneAllocator> {
        &self.allocator
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    pub fn profiler_mut(&mut self) -> &mut Profiler {
        &mut self.profiler
    }

    pub fn debug_flags(&self) -> DebugFlags {
        self.debug_flags
    }

    /// Change one of this engine's debug flags.
    pub fn set_debug_flag(&mut self, flag: DebugFlag, on: bool) {
        self.debug_flags.set(flag, on);
    }

    // Heap

    pub fn heap(&self) -> &Zone<Word> {
        &self.heap
    }

    /// Allocate `n` cells at the real heap pointer.
    pub fn alloc(&mut self, n: usize) -> Word {
        let addr = self.regs.hp;
        if n > 0 {
            self.heap.touch(addr + n - 1);
        }
        self.regs.hp = addr + n;
        addr
    }

    /// Allocate `n` cells from host code between calls. Both register copies
    /// see the new heap pointer.
    pub fn host_alloc(&mut self, n: usize) -> Word {
        let addr = self.fake_regs.hp;
        if n > 0 {
            self.heap.touch(addr + n - 1);
        }
        self.fake_regs.hp = addr + n;
        self.regs.hp = self.fake_regs.hp;
        addr
    }

    pub fn heap_get(&self, addr: Word) -> Word {
        *self.heap.get(addr)
    }

    pub fn heap_set(&mut self, addr: Word, value: Word) {
        self.heap.set(addr, value);
    }

    // Det stack

    /// Reserve `n` det stack slots.
    pub fn incr_sp(&mut self, n: usize) {
        let sp = self.regs.sp + n;
        if n > 0 {
            self.context.det_stack.touch(sp - 1);
        }
        self.regs.sp = sp;
    }

    /// Release `n` det stack slots.
    pub fn decr_sp(&mut self, n: usize) {
        let base = self.context.det_stack_base();
        match self.regs.sp.checked_sub(n) {
            Some(sp) if sp >= base => self.regs.sp = sp,
            _ => fatal(format_args!(
                "det stack underflow: sp {:#x} - {} below base {:#x}",
                self.regs.sp, n, base
            )),
        }
    }

    /// Det stack slot `n` below the stack pointer, counting from 1.
    pub fn stackvar(&self, n: usize) -> Word {
        *self.context.det_stack.get(self.stackvar_addr(n))
    }

    pub fn set_stackvar(&mut self, n: usize, value: Word) {
        let addr = self.stackvar_addr(n);
        self.context.det_stack.set(addr, value);
    }

    fn stackvar_addr(&self, n: usize) -> Word {
        match self.regs.sp.checked_sub(n) {
            Some(addr) if n > 0 && addr >= self.context.det_stack_base() => addr,
            _ => fatal(format_args!("no stackvar {} at sp {:#x}", n, self.regs.sp)),
        }
    }
}

/// Create an engine with the default configuration.
pub fn create_engine() -> EngineResult<Engine> {
    Engine::create(EngineConfig::default())
}

/// Destroy an engine created by [`create_engine`].
pub fn destroy_engine(engine: Engine) {
    engine.destroy();
}

/// Process shutdown hook. Engines release their memory when they are
/// destroyed or dropped, so all that is left is resetting the debug flag
/// defaults.
pub fn terminate_engine() {
    debug_flags::reset();
    info!(target: "nondet_vm::engine", "engine terminated");
}
