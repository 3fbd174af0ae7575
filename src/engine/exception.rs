//! Guest exceptions.
//!
//! A call boundary entered with `catch_exceptions` pushes an exception
//! handler frame before running guest code. [`Engine::throw`] finds the
//! nearest such frame, restores the trail, det stack and nondet stack to the
//! state they had when it was pushed, and stops the dispatch loop with
//! [`Halt::Unwind`] naming the boundary that owns the handler.

use tracing::debug;

use crate::code::{Halt, Transfer};

use super::boundary::ResumePoint;
use super::nondet::{BoundaryKind, HandlerInfo};
use super::primitives::Primitive;
use super::trail::{Ticket, UntrailReason};
use super::types::{fatal, ExceptionValue, Word};
use super::Engine;

impl Engine {
    /// Exception waiting to be collected by a call boundary.
    pub fn pending_exception(&self) -> Option<ExceptionValue> {
        self.exception
    }

    /// Throw `value` to the nearest exception handler.
    pub fn throw(&mut self, value: ExceptionValue) -> Transfer {
        let (handler, info) = match self.find_exception_handler() {
            Some(found) => found,
            None => fatal(format_args!("uncaught guest {}", value)),
        };
        let frame = self.frame(handler);
        let (prevfr, succfr) = (frame.prevfr, frame.succfr);

        self.reset_ticket(info.ticket, UntrailReason::Exception);
        self.prune_tickets_to(info.ticket);
        self.regs.sp = info.saved_sp;
        self.regs.maxfr = prevfr;
        self.regs.curfr = succfr;
        self.exception = Some(value);

        debug!(
            target: "nondet_vm::exception",
            %value,
            handler,
            boundary = info.boundary,
            "throw"
        );
        Transfer::Halt(self.leave_dispatch(Halt::Unwind {
            boundary: info.boundary,
        }))
    }

    fn find_exception_handler(&self) -> Option<(Word, HandlerInfo)> {
        let bottom = self.context.nondet_bottom();
        let mut fr = self.regs.maxfr;
        while fr > bottom {
            let frame = self.frame(fr);
            if let BoundaryKind::ExceptionHandler(info) = frame.boundary {
                return Some((fr, info));
            }
            fr = frame.prevfr;
        }
        None
    }

    pub(crate) fn push_exception_handler(&mut self, boundary: usize) -> Ticket {
        let ticket = self.store_ticket();
        let saved_sp = self.regs.sp;
        self.mkframe("exception_handler", 0, Primitive::ExceptionHandlerFail.addr());
        let curfr = self.regs.curfr;
        self.frame_mut(curfr).boundary = BoundaryKind::ExceptionHandler(HandlerInfo {
            boundary,
            ticket,
            saved_sp,
        });
        ticket
    }

    /// Drop the handler frame a catching boundary pushed and release its
    /// ticket, keeping every value assigned since.
    pub(crate) fn remove_exception_handler(&mut self, point: &ResumePoint, ticket: Ticket) {
        self.regs.maxfr = point.saved_maxfr;
        self.regs.curfr = point.saved_curfr;
        self.prune_tickets_to(ticket);
    }
}
