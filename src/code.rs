//! Guest code representation.
//!
//! Guest code is a graph of instruction blocks. Each block is a [`Label`]: a
//! static name plus a plain function that runs the block against the engine
//! and returns a [`Transfer`] naming where control goes next. Blocks never
//! call each other directly, so the native stack depth of a running guest
//! program stays bounded no matter how long its chain of blocks is.
//!
//! ```ignore
//! use nondet_vm::{CodeAddr, Engine, Label, Transfer, TRUE};
//!
//! fn answer(eng: &mut Engine) -> Transfer {
//!     eng.set_r(1, TRUE);
//!     eng.set_r(2, 42);
//!     eng.proceed()
//! }
//!
//! static ANSWER: Label = Label::new("answer", answer);
//!
//! let entry = CodeAddr::of(&ANSWER);
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::engine::Engine;

/// Signature of a guest instruction block.
pub type BlockFn = fn(&mut Engine) -> Transfer;

/// A named guest instruction block.
///
/// Labels are meant to live in `static` items; their address is the code
/// address the rest of the machine stores in registers and stack frames.
pub struct Label {
    name: &'static str,
    code: BlockFn,
}

impl Label {
    /// Define a label.
    pub const fn new(name: &'static str, code: BlockFn) -> Self {
        Self { name, code }
    }

    /// The label's name, as printed by traces and location dumps.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Label").field("name", &self.name).finish()
    }
}

/// Address of a guest instruction block.
///
/// Two addresses are equal only when they refer to the very same label, so an
/// address can be compared against a well-known block (such as the engine's
/// done label) without consulting the label's contents.
#[derive(Clone, Copy)]
pub struct CodeAddr(&'static Label);

impl CodeAddr {
    /// Address of a static label.
    #[inline]
    pub const fn of(label: &'static Label) -> Self {
        Self(label)
    }

    /// Name of the label at this address.
    #[inline]
    pub fn name(self) -> &'static str {
        self.0.name
    }

    /// Execute the block at this address.
    #[inline(always)]
    pub(crate) fn run(self, eng: &mut Engine) -> Transfer {
        (self.0.code)(eng)
    }

    fn as_ptr(self) -> *const Label {
        self.0 as *const Label
    }
}

impl PartialEq for CodeAddr {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.0, other.0)
    }
}

impl Eq for CodeAddr {}

impl Hash for CodeAddr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_ptr().hash(state);
    }
}

impl fmt::Debug for CodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:p}", self.0.name, self.as_ptr())
    }
}

impl fmt::Display for CodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.name)
    }
}

/// Where control goes after a block finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    /// Continue with the block at this address.
    Jump(CodeAddr),
    /// Leave the dispatch loop for the call boundary.
    Halt(Halt),
}

/// Reason the dispatch loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Halt {
    /// The guest chain reached the engine's done label.
    Done,
    /// A thrown exception was caught by the handler frame that the boundary
    /// at this nesting depth installed.
    Unwind { boundary: usize },
}
