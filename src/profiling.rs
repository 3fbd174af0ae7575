//! Profiling hooks used by the call boundary.
//!
//! Two independent switches:
//! - time profiling keeps a "current procedure" slot so that samples can be
//!   credited to the guest procedure being executed;
//! - call profiling counts (caller, callee) pairs when host code called from
//!   a known guest procedure re-enters guest code.
//!
//! Call pairs can only be recorded while time profiling knows the caller.

use std::collections::HashMap;

use tracing::trace;

use crate::code::CodeAddr;

/// Per-engine profiling state.
#[derive(Debug, Default)]
pub struct Profiler {
    time: bool,
    calls: bool,
    current_proc: Option<CodeAddr>,
    call_counts: HashMap<(CodeAddr, CodeAddr), u64>,
}

impl Profiler {
    pub fn new(time: bool, calls: bool) -> Self {
        Self {
            time,
            calls,
            ..Self::default()
        }
    }

    /// The procedure currently credited with execution time.
    pub fn current_proc(&self) -> Option<CodeAddr> {
        self.current_proc
    }

    /// Note that host code is about to enter guest code at `entry`.
    ///
    /// Returns the previous current procedure, which the caller must hand
    /// back to [`Profiler::leave`] once the call returns.
    pub(crate) fn enter(&mut self, entry: CodeAddr) -> Option<CodeAddr> {
        let prev = self.current_proc;
        if self.calls {
            if let Some(caller) = prev {
                *self.call_counts.entry((caller, entry)).or_insert(0) += 1;
                trace!(target: "nondet_vm::profiling", %caller, callee = %entry, "call pair");
            }
        }
        if self.time {
            self.current_proc = Some(entry);
        }
        prev
    }

    pub(crate) fn leave(&mut self, prev: Option<CodeAddr>) {
        if self.time {
            self.current_proc = prev;
        }
    }

    /// Number of recorded calls from `caller` to `callee`.
    pub fn call_count(&self, caller: CodeAddr, callee: CodeAddr) -> u64 {
        self.call_counts.get(&(caller, callee)).copied().unwrap_or(0)
    }

    /// All recorded call pairs with their counts, in no particular order.
    pub fn call_pairs(&self) -> impl Iterator<Item = (CodeAddr, CodeAddr, u64)> + '_ {
        self.call_counts
            .iter()
            .map(|(&(caller, callee), &count)| (caller, callee, count))
    }

    pub fn reset_counts(&mut self) {
        self.call_counts.clear();
    }
}
