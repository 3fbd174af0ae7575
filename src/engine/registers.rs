//! The machine register file.
//!
//! The engine keeps two copies of the register file: the real registers that
//! guest blocks read and write, and a shadow copy that host code uses to pass
//! arguments in and read results out. Control crossing the host/guest
//! boundary flushes one copy into the other:
//!
//! - `restore_transient_registers`: shadow -> real, transient registers only
//!   (argument registers, `hp`, `succip`); done on entry to guest code
//! - `restore_registers`: shadow -> real, everything
//! - `save_registers`: real -> shadow, everything; done right before the
//!   dispatch loop exits
//!
//! The stack registers (`sp`, `maxfr`, `curfr`) are non-transient: they stay
//! valid in the real file between calls, so entering guest code does not
//! reload them from the shadow copy.

use crate::code::CodeAddr;

use super::types::{fatal, Word, NUM_REAL_REGS};
use super::Engine;

/// One copy of the machine registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterFile {
    r: [Word; NUM_REAL_REGS],
    /// Heap pointer: next free heap cell
    pub hp: Word,
    /// Det stack pointer: next free det stack slot
    pub sp: Word,
    /// Topmost nondet stack frame
    pub maxfr: Word,
    /// Nondet frame of the procedure currently executing
    pub curfr: Word,
    /// Success continuation
    pub succip: CodeAddr,
}

impl RegisterFile {
    pub fn new(succip: CodeAddr) -> Self {
        Self {
            r: [0; NUM_REAL_REGS],
            hp: 0,
            sp: 0,
            maxfr: 0,
            curfr: 0,
            succip,
        }
    }

    /// Argument register `n`, counting from 1.
    #[inline]
    pub fn r(&self, n: usize) -> Word {
        match self.r.get(n.wrapping_sub(1)) {
            Some(w) => *w,
            None => bad_register(n),
        }
    }

    #[inline]
    pub fn set_r(&mut self, n: usize, value: Word) {
        match self.r.get_mut(n.wrapping_sub(1)) {
            Some(w) => *w = value,
            None => bad_register(n),
        }
    }

    /// All argument registers, `r1` first.
    pub fn args(&self) -> &[Word; NUM_REAL_REGS] {
        &self.r
    }

    #[inline]
    fn copy_transient_from(&mut self, other: &RegisterFile) {
        self.r = other.r;
        self.hp = other.hp;
        self.succip = other.succip;
    }
}

#[cold]
fn bad_register(n: usize) -> ! {
    fatal(format_args!("no register r{} (registers are r1..r{})", n, NUM_REAL_REGS))
}

impl Engine {
    /// The real registers.
    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    /// The shadow copy host code reads results from.
    pub fn shadow(&self) -> &RegisterFile {
        &self.fake_regs
    }

    /// The shadow copy host code writes arguments into before `enter`.
    pub fn shadow_mut(&mut self) -> &mut RegisterFile {
        &mut self.fake_regs
    }

    /// Real argument register `n`, counting from 1.
    #[inline]
    pub fn r(&self, n: usize) -> Word {
        self.regs.r(n)
    }

    #[inline]
    pub fn set_r(&mut self, n: usize, value: Word) {
        self.regs.set_r(n, value);
    }

    #[inline]
    pub fn restore_transient_registers(&mut self) {
        self.regs.copy_transient_from(&self.fake_regs);
    }

    #[inline]
    pub fn restore_registers(&mut self) {
        self.regs = self.fake_regs;
    }

    #[inline]
    pub fn save_registers(&mut self) {
        self.fake_regs = self.regs;
    }
}
