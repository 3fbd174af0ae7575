//! Host/guest call boundary.
//!
//! [`Engine::enter`] is how host code runs guest code. Boundaries nest: guest
//! code may call host code (see [`Engine::call_foreign`]), which may enter
//! guest code again. Each boundary records a [`ResumePoint`] holding what it
//! needs to restore once its dispatch loop stops:
//!
//! - normally, by reaching the done label;
//! - by a guest exception caught by the handler frame this boundary pushed;
//! - by a guest exception owned by an outer boundary, or a host panic, both
//!   of which unwind through this boundary to the frame that handles them.
//!
//! Guest exceptions cross intermediate host frames as a [`GuestUnwind`]
//! panic payload; every boundary catches unwinding with `catch_unwind`, puts
//! its own bookkeeping back, and either claims the exception or lets the
//! unwind continue.

use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, info, trace};

use crate::code::{CodeAddr, Halt};
use crate::debug_flags::DebugFlag;

use super::dispatch::{DefaultDispatch, Dispatch};
use super::primitives::Primitive;
use super::trail::Ticket;
use super::types::{fatal, ExceptionValue, Word};
use super::Engine;

/// State saved by one active call boundary.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResumePoint {
    pub depth: usize,
    pub entry: CodeAddr,
    pub saved_maxfr: Word,
    pub saved_curfr: Word,
    pub prev_floor: Word,
    pub prev_proc: Option<CodeAddr>,
    pub c_depth: usize,
    /// Trail ticket of the exception handler frame, if this boundary catches
    pub handler_ticket: Option<Ticket>,
}

/// Panic payload carrying a guest exception to the boundary that catches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuestUnwind {
    pub boundary: usize,
}

impl Engine {
    /// Run guest code at `entry` with the default dispatch strategy.
    ///
    /// Arguments are taken from the shadow registers and results are left
    /// there. With `catch_exceptions` set, an exception thrown by the called
    /// code (and not caught deeper) is returned instead of propagating to an
    /// enclosing boundary.
    pub fn enter(&mut self, entry: CodeAddr, catch_exceptions: bool) -> Option<ExceptionValue> {
        self.enter_with::<DefaultDispatch>(entry, catch_exceptions)
    }

    /// [`Engine::enter`] with an explicit dispatch strategy.
    ///
    /// Entering at `do_redo` or `do_fail` resumes choice points left by an
    /// earlier call. The call keeps the enclosing floor, so once the top
    /// frame is used up, older live frames of the same search are retried.
    pub fn enter_with<D: Dispatch>(
        &mut self,
        entry: CodeAddr,
        catch_exceptions: bool,
    ) -> Option<ExceptionValue> {
        self.restore_transient_registers();
        let resumption = Primitive::is_resumption(entry);
        if resumption && catch_exceptions {
            fatal(format_args!(
                "cannot catch exceptions when resuming at {}",
                entry
            ));
        }

        let depth = self.boundaries.len() + 1;
        let floor = if resumption {
            self.nondet_floor
        } else {
            self.regs.maxfr
        };
        let mut point = ResumePoint {
            depth,
            entry,
            saved_maxfr: self.regs.maxfr,
            saved_curfr: self.regs.curfr,
            prev_floor: self.nondet_floor,
            prev_proc: self.profiler.current_proc(),
            c_depth: self.call_depth(),
            handler_ticket: None,
        };
        if catch_exceptions {
            point.handler_ticket = Some(self.push_exception_handler(depth));
        }
        self.boundaries.push(point);
        self.nondet_floor = floor;
        self.profiler.enter(entry);

        let log_calls = self.debug_flags.is_set(DebugFlag::Call);
        if log_calls {
            info!(target: "nondet_vm::call", depth, %entry, "call");
        }
        debug!(
            target: "nondet_vm::boundary",
            depth,
            %entry,
            catch_exceptions,
            strategy = D::NAME,
            "enter"
        );
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| D::run(self, entry)));
        let point = self.leave_boundary(depth);

        match outcome {
            Ok(Halt::Done) => {
                self.restore_registers();
                if let Some(ticket) = point.handler_ticket {
                    self.remove_exception_handler(&point, ticket);
                    self.save_registers();
                }
                trace!(
                    target: "nondet_vm::boundary",
                    depth,
                    entry = %point.entry,
                    r1 = self.fake_regs.r(1),
                    "done"
                );
                if log_calls {
                    info!(
                        target: "nondet_vm::call",
                        depth,
                        entry = %point.entry,
                        r1 = self.fake_regs.r(1),
                        "return"
                    );
                }
                None
            }
            Ok(Halt::Unwind { boundary }) if boundary == depth => {
                self.restore_registers();
                self.take_exception(depth)
            }
            Ok(Halt::Unwind { boundary }) => {
                trace!(target: "nondet_vm::boundary", depth, boundary, "pass exception outward");
                panic::resume_unwind(Box::new(GuestUnwind { boundary }))
            }
            Err(payload) => {
                self.ownership_unwind_to(point.c_depth);
                let ours = matches!(
                    payload.downcast_ref::<GuestUnwind>(),
                    Some(unwind) if unwind.boundary == depth
                );
                if !ours {
                    if let Some(ticket) = point.handler_ticket {
                        self.remove_exception_handler(&point, ticket);
                    }
                    panic::resume_unwind(payload);
                }
                self.restore_registers();
                self.take_exception(depth)
            }
        }
    }

    fn leave_boundary(&mut self, depth: usize) -> ResumePoint {
        let point = match self.boundaries.pop() {
            Some(point) if point.depth == depth => point,
            other => fatal(format_args!(
                "boundary stack corrupted: expected depth {}, found {:?}",
                depth, other
            )),
        };
        self.nondet_floor = point.prev_floor;
        self.profiler.leave(point.prev_proc);
        point
    }

    fn take_exception(&mut self, depth: usize) -> Option<ExceptionValue> {
        let value = self.exception.take();
        if value.is_none() {
            fatal(format_args!("boundary {} unwound without an exception", depth));
        }
        debug!(target: "nondet_vm::boundary", depth, "caught exception");
        value
    }

    /// Number of active call boundaries.
    pub fn boundary_depth(&self) -> usize {
        self.boundaries.len()
    }

    /// Run host code from inside a guest block.
    ///
    /// The real registers are saved to the shadow copy first, so `f` sees the
    /// guest's register state through [`Engine::shadow`] and may call
    /// [`Engine::enter`]; the shadow copy is loaded back afterwards.
    pub fn call_foreign<R>(&mut self, f: impl FnOnce(&mut Engine) -> R) -> R {
        self.save_registers();
        let result = f(self);
        self.restore_registers();
        result
    }
}
