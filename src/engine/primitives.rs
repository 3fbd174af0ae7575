//! Special blocks every engine provides.
//!
//! Guest code jumps to these like to any other block, typically by storing
//! their address as a `redoip` or `succip`.

use tracing::error;

use crate::code::{CodeAddr, Label, Transfer};

use super::types::fatal;
use super::Engine;

/// The built-in control blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// Retry the top nondet frame
    Redo,
    /// Discard the top nondet frame and retry the one below
    Fail,
    /// Return a solution, keeping the current frame
    Succeed,
    /// Return the last solution, popping the current frame
    SucceedDiscard,
    /// Marks code that must never run
    NotReached,
    /// Retry point of an exception handler frame: the guarded call produced
    /// no more solutions, so the handler frame is dropped as well
    ExceptionHandlerFail,
}

static DO_REDO: Label = Label::new("do_redo", do_redo);
static DO_FAIL: Label = Label::new("do_fail", do_fail);
static DO_SUCCEED: Label = Label::new("do_succeed", do_succeed);
static DO_LAST_SUCCEED: Label = Label::new("do_last_succeed", do_last_succeed);
static DO_NOT_REACHED: Label = Label::new("do_not_reached", do_not_reached);
static EXCEPTION_HANDLER_DO_FAIL: Label = Label::new("exception_handler_do_fail", do_fail);
static ENGINE_DONE: Label = Label::new("engine_done", do_engine_done);

impl Primitive {
    pub const ALL: [Primitive; 6] = [
        Primitive::Redo,
        Primitive::Fail,
        Primitive::Succeed,
        Primitive::SucceedDiscard,
        Primitive::NotReached,
        Primitive::ExceptionHandlerFail,
    ];

    fn label(self) -> &'static Label {
        match self {
            Self::Redo => &DO_REDO,
            Self::Fail => &DO_FAIL,
            Self::Succeed => &DO_SUCCEED,
            Self::SucceedDiscard => &DO_LAST_SUCCEED,
            Self::NotReached => &DO_NOT_REACHED,
            Self::ExceptionHandlerFail => &EXCEPTION_HANDLER_DO_FAIL,
        }
    }

    #[inline]
    pub fn addr(self) -> CodeAddr {
        CodeAddr::of(self.label())
    }

    pub fn name(self) -> &'static str {
        self.label().name()
    }

    pub fn from_addr(addr: CodeAddr) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.addr() == addr)
    }

    /// Whether entering at `addr` resumes choice points left by an earlier
    /// call rather than starting a new one.
    pub fn is_resumption(addr: CodeAddr) -> bool {
        matches!(
            Self::from_addr(addr),
            Some(Self::Redo | Self::Fail | Self::ExceptionHandlerFail)
        )
    }
}

/// The block that ends a dispatch loop normally.
#[inline]
pub fn engine_done() -> CodeAddr {
    CodeAddr::of(&ENGINE_DONE)
}

fn do_redo(eng: &mut Engine) -> Transfer {
    eng.redo()
}

fn do_fail(eng: &mut Engine) -> Transfer {
    eng.fail()
}

fn do_succeed(eng: &mut Engine) -> Transfer {
    eng.succeed()
}

fn do_last_succeed(eng: &mut Engine) -> Transfer {
    eng.succeed_discard()
}

fn do_engine_done(eng: &mut Engine) -> Transfer {
    Transfer::Halt(eng.finish_done())
}

fn do_not_reached(eng: &mut Engine) -> Transfer {
    error!(
        target: "nondet_vm::primitives",
        maxfr = eng.regs.maxfr,
        curfr = eng.regs.curfr,
        "reached do_not_reached"
    );
    eng.dump_prev_locations();
    fatal("reached not_reached code")
}
