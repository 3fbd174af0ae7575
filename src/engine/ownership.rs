//! Context ownership for re-entrant calls.
//!
//! Every dispatch loop claims the engine's context for the engine's thread
//! and remembers the previous owner. On the way out the context must still
//! belong to the engine's thread; the previous owner is then put back. The
//! nesting depth of dispatch loops is `call_depth`.
//!
//! Without the `thread-safe` feature none of this is tracked.

#[cfg(feature = "thread-safe")]
use std::thread::ThreadId;

#[cfg(feature = "thread-safe")]
use tracing::trace;

#[cfg(feature = "thread-safe")]
use super::types::fatal;
use super::Engine;

#[cfg(feature = "thread-safe")]
impl Engine {
    pub(crate) fn ownership_enter(&mut self) {
        self.c_depth += 1;
        self.saved_owners.push(self.context.owner);
        self.context.owner = Some(self.owner_thread);
        trace!(target: "nondet_vm::ownership", depth = self.c_depth, "claim context");
    }

    pub(crate) fn ownership_exit(&mut self) {
        if self.context.owner != Some(self.owner_thread) {
            fatal(format_args!(
                "context `{}` owned by {:?} on exit from engine thread {:?}",
                self.context.name(),
                self.context.owner,
                self.owner_thread
            ));
        }
        self.c_depth -= 1;
        self.context.owner = self.saved_owners.pop().flatten();
        trace!(target: "nondet_vm::ownership", depth = self.c_depth, "release context");
    }

    /// Undo the claims of dispatch loops abandoned by unwinding, down to
    /// `depth`. No ownership check: the loops being dropped may have failed
    /// that very check.
    pub(crate) fn ownership_unwind_to(&mut self, depth: usize) {
        while self.c_depth > depth {
            self.c_depth -= 1;
            self.context.owner = self.saved_owners.pop().flatten();
        }
    }

    /// Number of dispatch loops currently running on this engine.
    pub fn call_depth(&self) -> usize {
        self.c_depth
    }

    /// Owners to restore as the running dispatch loops finish, outermost
    /// first.
    pub fn saved_owners(&self) -> &[Option<ThreadId>] {
        &self.saved_owners
    }

    /// Thread the engine was created on.
    pub fn owner_thread(&self) -> ThreadId {
        self.owner_thread
    }
}

#[cfg(not(feature = "thread-safe"))]
impl Engine {
    #[inline(always)]
    pub(crate) fn ownership_enter(&mut self) {}

    #[inline(always)]
    pub(crate) fn ownership_exit(&mut self) {}

    #[inline(always)]
    pub(crate) fn ownership_unwind_to(&mut self, _depth: usize) {}

    /// Always 0: nesting is not tracked without `thread-safe`.
    pub fn call_depth(&self) -> usize {
        0
    }
}
