//! nondet-vm - an execution engine for nondeterministic guest code
//!
//! This library runs compiled guest programs expressed as a graph of
//! instruction blocks over an abstract register machine with a heap, a det
//! stack, a nondet (choice point) stack and a trail.
//!
//! # Architecture
//!
//! 1. **Code** (`code` module)
//!    - Guest blocks are static [`Label`]s holding `fn(&mut Engine) -> Transfer`
//!    - A block never calls the next one; it returns where to go
//!
//! 2. **Engine** (`engine` module)
//!    - Real and shadow register files
//!    - Nondet frames, trail, heap and det stack on allocator-provided zones
//!    - Call boundary: host code enters guest code with [`Engine::enter`],
//!      boundaries nest through [`Engine::call_foreign`]
//!    - Dispatch loops: [`Trampoline`] (default) and [`DirectDispatch`]
//!    - Guest exceptions with handler frames and trail undo
//!
//! 3. **Ambient services**
//!    - `memory`: the zone allocator interface
//!    - `config`: engine configuration, loadable from TOML
//!    - `debug_flags`: process-wide debug flag defaults
//!    - `profiling`: current-procedure slot and call-pair counts
//!
//! # Example
//!
//! ```rust
//! use nondet_vm::{CodeAddr, Engine, EngineConfig, Label, Primitive, Transfer, TRUE, FALSE};
//!
//! // Yields 10, then 20.
//! fn two(eng: &mut Engine) -> Transfer {
//!     eng.mkframe("two", 0, CodeAddr::of(&TWO_LAST));
//!     eng.set_r(1, TRUE);
//!     eng.set_r(2, 10);
//!     eng.succeed()
//! }
//!
//! fn two_last(eng: &mut Engine) -> Transfer {
//!     eng.set_r(1, TRUE);
//!     eng.set_r(2, 20);
//!     eng.succeed_discard()
//! }
//!
//! static TWO: Label = Label::new("two", two);
//! static TWO_LAST: Label = Label::new("two_last", two_last);
//!
//! let mut eng = Engine::create(EngineConfig::small()).unwrap();
//! eng.enter(CodeAddr::of(&TWO), false);
//! assert_eq!(eng.shadow().r(2), 10);
//!
//! eng.enter(Primitive::Redo.addr(), false);
//! assert_eq!(eng.shadow().r(2), 20);
//!
//! eng.enter(Primitive::Redo.addr(), false);
//! assert_eq!(eng.shadow().r(1), FALSE);
//! ```

pub mod code;
pub mod config;
pub mod debug_flags;
pub mod engine;
pub mod memory;
pub mod profiling;

pub use code::{BlockFn, CodeAddr, Halt, Label, Transfer};
pub use config::{ConfigError, EngineConfig};
pub use debug_flags::{DebugFlag, DebugFlags};
pub use engine::{
    create_engine, destroy_engine, engine_done, fatal, terminate_engine, Context,
    DefaultDispatch, DirectDispatch, Dispatch, Engine, EngineError, EngineResult,
    ExceptionValue, Primitive, RegisterFile, Ticket, Trampoline, UntrailReason, Word, FALSE,
    TRUE,
};
pub use memory::{SystemZoneAllocator, ZoneAllocator, ZoneError};
pub use profiling::Profiler;
