//! Nondet stack frames and the control primitives built on them.
//!
//! A nondet procedure allocates a frame with [`Engine::mkframe`]. The frame
//! records where to go on success (`succip` in the caller's frame `succfr`)
//! and where to go when execution backtracks into it (`redoip`, run with
//! `curfr` set to `redofr`). `maxfr` always names the topmost frame; the
//! chain of `prevfr` links leads down to the context's bottom frame.
//!
//! Backtracking never crosses the floor of the innermost call boundary: once
//! every frame above the floor has failed, the call returns `FALSE` in `r1`.

use smallvec::SmallVec;
use tracing::trace;

use crate::code::{CodeAddr, Transfer};

use super::primitives::{engine_done, Primitive};
use super::trail::Ticket;
use super::types::{fatal, Word, FALSE};
use super::Engine;

/// Extra role of a nondet frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BoundaryKind {
    #[default]
    None,
    /// Exception handler installed by a catching call boundary
    ExceptionHandler(HandlerInfo),
}

/// State an exception handler frame restores when an exception reaches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerInfo {
    /// Nesting depth of the call boundary that installed the handler
    pub boundary: usize,
    /// Trail position when the handler was installed
    pub ticket: Ticket,
    /// Det stack pointer when the handler was installed
    pub saved_sp: Word,
}

#[derive(Debug, Clone)]
pub struct NondetFrame {
    pub name: &'static str,
    pub prevfr: Word,
    pub redoip: CodeAddr,
    pub redofr: Word,
    pub succip: CodeAddr,
    pub succfr: Word,
    pub boundary: BoundaryKind,
    pub vars: SmallVec<[Word; 4]>,
}

impl NondetFrame {
    /// The self-linked frame at the base of a nondet stack.
    pub(crate) fn bottom(addr: Word, not_reached: CodeAddr) -> Self {
        Self {
            name: "bottom",
            prevfr: addr,
            redoip: not_reached,
            redofr: addr,
            succip: not_reached,
            succfr: addr,
            boundary: BoundaryKind::None,
            vars: SmallVec::new(),
        }
    }

    pub fn is_exception_handler(&self) -> bool {
        matches!(self.boundary, BoundaryKind::ExceptionHandler(_))
    }
}

impl Default for NondetFrame {
    fn default() -> Self {
        Self::bottom(0, Primitive::NotReached.addr())
    }
}

impl Engine {
    /// The nondet frame at `addr`.
    pub fn frame(&self, addr: Word) -> &NondetFrame {
        self.context.nondet_stack.get(addr)
    }

    pub(crate) fn frame_mut(&mut self, addr: Word) -> &mut NondetFrame {
        self.context.nondet_stack.get_mut(addr)
    }

    /// Push a frame for the current procedure with `nvars` frame variables,
    /// and make it both `maxfr` and `curfr`.
    pub fn mkframe(&mut self, name: &'static str, nvars: usize, redoip: CodeAddr) {
        let prevfr = self.regs.maxfr;
        let new = prevfr + 1;
        let frame = NondetFrame {
            name,
            prevfr,
            redoip,
            redofr: new,
            succip: self.regs.succip,
            succfr: self.regs.curfr,
            boundary: BoundaryKind::None,
            vars: SmallVec::from_elem(0, nvars),
        };
        self.context.nondet_stack.set(new, frame);
        self.regs.maxfr = new;
        self.regs.curfr = new;
        trace!(target: "nondet_vm::nondet", name, frame = new, %redoip, "mkframe");
    }

    /// Push a temporary frame that only carries a retry point for the
    /// current procedure. `curfr` is left alone.
    pub fn mktempframe(&mut self, redoip: CodeAddr) {
        let prevfr = self.regs.maxfr;
        let new = prevfr + 1;
        let frame = NondetFrame {
            name: "temp",
            prevfr,
            redoip,
            redofr: self.regs.curfr,
            succip: Primitive::NotReached.addr(),
            succfr: self.regs.curfr,
            boundary: BoundaryKind::None,
            vars: SmallVec::new(),
        };
        self.context.nondet_stack.set(new, frame);
        self.regs.maxfr = new;
        trace!(target: "nondet_vm::nondet", frame = new, %redoip, "mktempframe");
    }

    /// Set the retry point of the current frame.
    pub fn set_redoip(&mut self, redoip: CodeAddr) {
        let curfr = self.regs.curfr;
        self.frame_mut(curfr).redoip = redoip;
    }

    /// Frame variable `n` of the current frame, counting from 1.
    pub fn framevar(&self, n: usize) -> Word {
        let frame = self.frame(self.regs.curfr);
        match frame.vars.get(n.wrapping_sub(1)) {
            Some(w) => *w,
            None => bad_framevar(frame.name, n, frame.vars.len()),
        }
    }

    pub fn set_framevar(&mut self, n: usize, value: Word) {
        let curfr = self.regs.curfr;
        let frame = self.frame_mut(curfr);
        let name = frame.name;
        let len = frame.vars.len();
        match frame.vars.get_mut(n.wrapping_sub(1)) {
            Some(w) => *w = value,
            None => bad_framevar(name, n, len),
        }
    }

    /// Floor of the innermost call boundary.
    pub fn nondet_floor(&self) -> Word {
        self.nondet_floor
    }

    /// Number of frames between `maxfr` and the bottom frame.
    pub fn nondet_depth(&self) -> usize {
        let bottom = self.context.nondet_bottom();
        let mut fr = self.regs.maxfr;
        let mut depth = 0;
        while fr > bottom {
            fr = self.frame(fr).prevfr;
            depth += 1;
        }
        depth
    }

    /// Discard the top frame and retry the one below it.
    pub fn fail(&mut self) -> Transfer {
        if self.regs.maxfr <= self.nondet_floor {
            return self.exhausted();
        }
        self.regs.maxfr = self.frame(self.regs.maxfr).prevfr;
        if self.regs.maxfr <= self.nondet_floor {
            return self.exhausted();
        }
        self.resume_top()
    }

    /// Retry the top frame without discarding it.
    pub fn redo(&mut self) -> Transfer {
        if self.regs.maxfr <= self.nondet_floor {
            return self.exhausted();
        }
        self.resume_top()
    }

    fn resume_top(&mut self) -> Transfer {
        let top = self.frame(self.regs.maxfr);
        let (redoip, redofr) = (top.redoip, top.redofr);
        self.regs.curfr = redofr;
        trace!(target: "nondet_vm::nondet", frame = self.regs.maxfr, %redoip, "resume");
        Transfer::Jump(redoip)
    }

    /// Every choice point above the boundary floor is gone: report failure to
    /// the host caller, with `curfr` back where the call found it.
    fn exhausted(&mut self) -> Transfer {
        trace!(target: "nondet_vm::nondet", floor = self.nondet_floor, "no more alternatives");
        if let Some(point) = self.boundaries.last() {
            self.regs.curfr = point.saved_curfr;
        }
        self.regs.set_r(1, FALSE);
        Transfer::Jump(engine_done())
    }

    /// Return a solution to the caller, keeping the current frame so that it
    /// can be retried later.
    pub fn succeed(&mut self) -> Transfer {
        let child = self.frame(self.regs.curfr);
        let (succip, succfr) = (child.succip, child.succfr);
        self.regs.curfr = succfr;
        Transfer::Jump(succip)
    }

    /// Return the last solution to the caller and pop the current frame.
    pub fn succeed_discard(&mut self) -> Transfer {
        let child = self.frame(self.regs.curfr);
        let (succip, succfr, prevfr) = (child.succip, child.succfr, child.prevfr);
        self.regs.maxfr = prevfr;
        self.regs.curfr = succfr;
        Transfer::Jump(succip)
    }

    /// Return from a det procedure.
    #[inline]
    pub fn proceed(&mut self) -> Transfer {
        Transfer::Jump(self.regs.succip)
    }

    /// Call `entry`, which returns to `cont`.
    #[inline]
    pub fn call(&mut self, entry: CodeAddr, cont: CodeAddr) -> Transfer {
        self.regs.succip = cont;
        Transfer::Jump(entry)
    }
}

#[cold]
fn bad_framevar(frame: &str, n: usize, len: usize) -> ! {
    fatal(format_args!(
        "frame `{}` has no framevar {} (it has {})",
        frame, n, len
    ))
}
