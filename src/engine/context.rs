//! Execution contexts.
//!
//! A context owns the stacks of one thread of guest execution: the det stack,
//! the nondet stack and the trail. The heap belongs to the engine. The nondet
//! stack starts with a bottom frame whose `prevfr` is itself and whose
//! `redoip` is `do_not_reached`, so backtracking below the first real frame is
//! caught instead of running off the stack.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[cfg(feature = "thread-safe")]
use std::thread::ThreadId;

use tracing::debug;

use crate::config::EngineConfig;
use crate::memory::{Zone, ZoneAllocator, ZoneRequest};

use super::nondet::NondetFrame;
use super::primitives::Primitive;
use super::trail::Trail;
use super::types::{EngineResult, Word};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
pub struct Context {
    name: String,
    id: u64,
    #[cfg(feature = "thread-safe")]
    pub(crate) owner: Option<ThreadId>,
    pub(crate) det_stack: Zone<Word>,
    pub(crate) nondet_stack: Zone<NondetFrame>,
    pub(crate) trail: Trail,
}

impl Context {
    pub(crate) fn create(
        config: &EngineConfig,
        allocator: &Arc<dyn ZoneAllocator>,
    ) -> EngineResult<Self> {
        let align = config.zone_alignment;
        let det_stack = Zone::create(
            allocator,
            &ZoneRequest::new("detstack", config.det_stack_size, config.det_stack_redzone)
                .with_alignment(align),
        )?;
        let mut nondet_stack = Zone::create(
            allocator,
            &ZoneRequest::new(
                "nondetstack",
                config.nondet_stack_size,
                config.nondet_stack_redzone,
            )
            .with_alignment(align),
        )?;
        let trail = Trail::create(config, allocator)?;

        let bottom = nondet_stack.base();
        nondet_stack.set(bottom, NondetFrame::bottom(bottom, Primitive::NotReached.addr()));

        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        debug!(
            target: "nondet_vm::context",
            id,
            name = %config.context_name,
            "created context"
        );

        Ok(Self {
            name: config.context_name.clone(),
            id,
            #[cfg(feature = "thread-safe")]
            owner: None,
            det_stack,
            nondet_stack,
            trail,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Address of the bottom nondet frame.
    pub fn nondet_bottom(&self) -> Word {
        self.nondet_stack.base()
    }

    pub fn det_stack_base(&self) -> Word {
        self.det_stack.base()
    }

    /// Thread currently running guest code on this context, if any.
    #[cfg(feature = "thread-safe")]
    pub fn owner(&self) -> Option<ThreadId> {
        self.owner
    }

    /// Overwrite the owner. The engine checks ownership when leaving a
    /// dispatch loop, so changing it while guest code runs is fatal.
    #[cfg(feature = "thread-safe")]
    pub fn set_owner(&mut self, owner: Option<ThreadId>) {
        self.owner = owner;
    }

    pub(crate) fn destroy(self) {
        debug!(target: "nondet_vm::context", id = self.id, name = %self.name, "destroyed context");
    }
}
