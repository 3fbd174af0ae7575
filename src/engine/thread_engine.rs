//! One engine per host thread.
//!
//! Host programs that run guest code on several threads give each thread its
//! own engine. These helpers keep it in a thread-local slot.

use std::cell::RefCell;

use tracing::debug;

use crate::config::EngineConfig;

use super::types::EngineResult;
use super::Engine;

thread_local! {
    static THREAD_ENGINE: RefCell<Option<Engine>> = const { RefCell::new(None) };
}

/// Create this thread's engine. Returns `Ok(false)` if it already has one.
pub fn init_thread_engine(config: EngineConfig) -> EngineResult<bool> {
    THREAD_ENGINE.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_some() {
            return Ok(false);
        }
        *slot = Some(Engine::create(config)?);
        debug!(target: "nondet_vm::thread_engine", thread = ?std::thread::current().id(), "thread engine ready");
        Ok(true)
    })
}

/// Run `f` with this thread's engine, or return `None` if the thread has
/// none.
///
/// Guest code running inside `f` must use the engine it is handed rather
/// than calling this again.
pub fn with_thread_engine<R>(f: impl FnOnce(&mut Engine) -> R) -> Option<R> {
    THREAD_ENGINE.with(|slot| slot.borrow_mut().as_mut().map(f))
}

/// Destroy this thread's engine. Returns `false` if there was none.
pub fn finalize_thread_engine() -> bool {
    let engine = THREAD_ENGINE.with(|slot| slot.borrow_mut().take());
    match engine {
        Some(engine) => {
            engine.destroy();
            true
        }
        None => false,
    }
}
