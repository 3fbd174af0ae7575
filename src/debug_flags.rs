//! Named debugging flags.
//!
//! The process keeps one set of default flags, initialised lazily (empty) and
//! optionally loaded from the `NONDET_VM_DEBUG` environment variable, a
//! comma-separated list of flag names. Every engine copies the defaults when
//! it is created and may then change its own copy, so toggling a flag on one
//! engine never affects another.

use std::fmt;
use std::sync::LazyLock;

use parking_lot::RwLock;
use tracing::debug;

use crate::config::ConfigError;

/// Environment variable read by [`init_from_env`].
pub const DEBUG_FLAGS_ENV: &str = "NONDET_VM_DEBUG";

/// A single debugging flag.
///
/// Only `Goto`, `Call` and `Trace` change what the engine does. The other
/// names are reserved for the stack, heap and tabling layers built on top of
/// the engine; they are accepted and stored but nothing in this crate reads
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DebugFlag {
    Prog,
    /// Log every block the dispatch loop enters
    Goto,
    /// Log every call boundary entry and normal return
    Call,
    Heap,
    DetStack,
    NondetStack,
    Final,
    Mem,
    Sreg,
    /// Record recently executed blocks for post-mortem dumps
    Trace,
    Table,
    TableHash,
    TableStack,
    Unbuf,
    Agc,
    OrdinaryReg,
    AnyReg,
    PrintLocn,
    Enabled,
    NotNearest,
    DebugSlots,
    DeepDebugFile,
    Detail,
}

impl DebugFlag {
    pub const ALL: [DebugFlag; 23] = [
        DebugFlag::Prog,
        DebugFlag::Goto,
        DebugFlag::Call,
        DebugFlag::Heap,
        DebugFlag::DetStack,
        DebugFlag::NondetStack,
        DebugFlag::Final,
        DebugFlag::Mem,
        DebugFlag::Sreg,
        DebugFlag::Trace,
        DebugFlag::Table,
        DebugFlag::TableHash,
        DebugFlag::TableStack,
        DebugFlag::Unbuf,
        DebugFlag::Agc,
        DebugFlag::OrdinaryReg,
        DebugFlag::AnyReg,
        DebugFlag::PrintLocn,
        DebugFlag::Enabled,
        DebugFlag::NotNearest,
        DebugFlag::DebugSlots,
        DebugFlag::DeepDebugFile,
        DebugFlag::Detail,
    ];

    /// The flag's name as accepted by [`DebugFlag::from_name`].
    pub fn name(self) -> &'static str {
        match self {
            DebugFlag::Prog => "prog",
            DebugFlag::Goto => "goto",
            DebugFlag::Call => "call",
            DebugFlag::Heap => "heap",
            DebugFlag::DetStack => "detstack",
            DebugFlag::NondetStack => "nondstack",
            DebugFlag::Final => "final",
            DebugFlag::Mem => "mem",
            DebugFlag::Sreg => "sreg",
            DebugFlag::Trace => "trace",
            DebugFlag::Table => "table",
            DebugFlag::TableHash => "hash",
            DebugFlag::TableStack => "tablestack",
            DebugFlag::Unbuf => "unbuf",
            DebugFlag::Agc => "agc",
            DebugFlag::OrdinaryReg => "ordreg",
            DebugFlag::AnyReg => "anyreg",
            DebugFlag::PrintLocn => "printlocn",
            DebugFlag::Enabled => "enabled",
            DebugFlag::NotNearest => "notnearest",
            DebugFlag::DebugSlots => "debugslots",
            DebugFlag::DeepDebugFile => "deepdebugfile",
            DebugFlag::Detail => "detail",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|flag| flag.name() == name)
    }

    #[inline]
    fn bit(self) -> u32 {
        1 << (self as u8)
    }
}

impl fmt::Display for DebugFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of debug flags.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DebugFlags {
    bits: u32,
}

impl DebugFlags {
    pub const fn none() -> Self {
        Self { bits: 0 }
    }

    #[inline]
    pub fn is_set(&self, flag: DebugFlag) -> bool {
        self.bits & flag.bit() != 0
    }

    pub fn set(&mut self, flag: DebugFlag, on: bool) {
        if on {
            self.bits |= flag.bit();
        } else {
            self.bits &= !flag.bit();
        }
    }

    pub fn with(mut self, flag: DebugFlag) -> Self {
        self.set(flag, true);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Flags that are set, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = DebugFlag> + '_ {
        DebugFlag::ALL.iter().copied().filter(|flag| self.is_set(*flag))
    }

    /// Parse a comma-separated list of flag names. Blank entries are ignored.
    pub fn parse(list: &str) -> Result<Self, ConfigError> {
        let mut flags = Self::none();
        for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let flag = DebugFlag::from_name(name)
                .ok_or_else(|| ConfigError::UnknownDebugFlag(name.to_string()))?;
            flags.set(flag, true);
        }
        Ok(flags)
    }
}

impl fmt::Debug for DebugFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Process-wide defaults copied into each new engine.
static DEFAULT_FLAGS: LazyLock<RwLock<DebugFlags>> =
    LazyLock::new(|| RwLock::new(DebugFlags::none()));

/// Current process-wide defaults.
pub fn defaults() -> DebugFlags {
    *DEFAULT_FLAGS.read()
}

/// Change one process-wide default. Engines that already exist keep their
/// own copy.
pub fn set_default(flag: DebugFlag, on: bool) {
    DEFAULT_FLAGS.write().set(flag, on);
}

/// Replace the process-wide defaults with the flags named in
/// `NONDET_VM_DEBUG`. An unset variable clears them.
pub fn init_from_env() -> Result<DebugFlags, ConfigError> {
    let flags = match std::env::var(DEBUG_FLAGS_ENV) {
        Ok(list) => DebugFlags::parse(&list)?,
        Err(_) => DebugFlags::none(),
    };
    *DEFAULT_FLAGS.write() = flags;
    debug!(target: "nondet_vm::debug_flags", ?flags, "initialised debug flags");
    Ok(flags)
}

/// Clear the process-wide defaults.
pub fn reset() {
    *DEFAULT_FLAGS.write() = DebugFlags::none();
}
