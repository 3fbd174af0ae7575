//! Register hand-off, re-entrant calls, profiling and context ownership

mod common;

use common::{engine, result, set_args, ANSWER, RANGE};
use nondet_vm::{CodeAddr, Engine, EngineConfig, Label, Transfer, TRUE};

#[test]
fn test_results_land_in_shadow_registers() {
    let mut eng = engine();
    set_args(&mut eng, 40, 2);

    eng.enter(CodeAddr::of(&ANSWER), false);

    assert_eq!(result(&eng), Some(42));
    assert_eq!(eng.shadow(), eng.registers());
}

#[test]
fn test_entry_reloads_transient_registers_only() {
    let mut eng = engine();
    let sp = eng.registers().sp;
    let base = eng.heap().base();

    eng.shadow_mut().hp = base + 8;
    eng.shadow_mut().sp = sp + 100;
    set_args(&mut eng, 1, 1);
    eng.enter(CodeAddr::of(&ANSWER), false);

    // hp is transient and was taken from the shadow copy; sp was not, and
    // the shadow's stale sp is overwritten when the call saves registers.
    assert_eq!(eng.registers().hp, base + 8);
    assert_eq!(eng.registers().sp, sp);
    assert_eq!(eng.shadow().sp, sp);
}

// Records what the engine looks like from inside a nested call:
// r5 = boundary depth, r6 = dispatch loop depth, r7 = whether the context is
// owned by this thread.

static REPORT: Label = Label::new("report", report);

fn report(eng: &mut Engine) -> Transfer {
    eng.set_r(5, eng.boundary_depth());
    eng.set_r(6, eng.call_depth());
    #[cfg(feature = "thread-safe")]
    eng.set_r(7, (eng.context().owner() == Some(std::thread::current().id())) as usize);
    eng.set_r(1, TRUE);
    eng.proceed()
}

static NESTED_REPORT: Label = Label::new("nested_report", nested_report);

fn nested_report(eng: &mut Engine) -> Transfer {
    eng.call_foreign(|eng| {
        eng.enter(CodeAddr::of(&REPORT), false);
    });
    eng.proceed()
}

#[test]
fn test_nested_call_depths() {
    let mut eng = engine();

    eng.enter(CodeAddr::of(&NESTED_REPORT), false);

    assert_eq!(eng.shadow().r(1), TRUE);
    assert_eq!(eng.shadow().r(5), 2);
    assert_eq!(eng.boundary_depth(), 0);
    #[cfg(feature = "thread-safe")]
    {
        assert_eq!(eng.shadow().r(6), 2);
        assert_eq!(eng.shadow().r(7), 1);
        assert_eq!(eng.call_depth(), 0);
        assert_eq!(eng.context().owner(), None);
    }
}

#[test]
fn test_call_foreign_sees_guest_registers() {
    static PEEK: Label = Label::new("peek", peek);

    fn peek(eng: &mut Engine) -> Transfer {
        eng.set_r(8, 123);
        let seen = eng.call_foreign(|eng| {
            let seen = eng.shadow().r(8);
            eng.shadow_mut().set_r(9, seen + 1);
            seen
        });
        eng.set_r(10, seen);
        eng.proceed()
    }

    let mut eng = engine();
    eng.enter(CodeAddr::of(&PEEK), false);

    assert_eq!(eng.shadow().r(9), 124);
    assert_eq!(eng.shadow().r(10), 123);
}

#[cfg(feature = "thread-safe")]
mod ownership {
    use super::*;

    static STEAL_CONTEXT: Label = Label::new("steal_context", steal_context);

    fn steal_context(eng: &mut Engine) -> Transfer {
        eng.context_mut().set_owner(None);
        eng.proceed()
    }

    #[test]
    #[should_panic(expected = "on exit from engine thread")]
    fn test_ownership_violation_is_fatal() {
        let mut eng = engine();
        eng.enter(CodeAddr::of(&STEAL_CONTEXT), false);
    }

    #[test]
    fn test_ownership_unwound_after_violation() {
        let mut eng = engine();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            eng.enter(CodeAddr::of(&STEAL_CONTEXT), false)
        }));

        assert!(outcome.is_err());
        assert_eq!(eng.call_depth(), 0);
        assert!(eng.saved_owners().is_empty());
        assert_eq!(eng.context().owner(), None);
    }

    #[test]
    fn test_engine_per_thread() {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                std::thread::spawn(move || {
                    let mut eng = engine();
                    set_args(&mut eng, i, 10);
                    eng.enter(CodeAddr::of(&REPORT), false);
                    assert_eq!(eng.owner_thread(), std::thread::current().id());
                    eng.shadow().r(7)
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().expect("thread should finish"), 1);
        }
    }
}

// Profiling: the outer procedure is the caller of the nested entry.

static PROFILED_OUTER: Label = Label::new("profiled_outer", profiled_outer);

fn profiled_outer(eng: &mut Engine) -> Transfer {
    let current = eng.profiler().current_proc();
    assert_eq!(current, Some(CodeAddr::of(&PROFILED_OUTER)));
    eng.call_foreign(|eng| {
        set_args(eng, 1, 2);
        eng.enter(CodeAddr::of(&ANSWER), false);
        eng.enter(CodeAddr::of(&ANSWER), false);
    });
    eng.proceed()
}

#[test]
fn test_profiling_counts_call_pairs() {
    common::init_tracing();
    let mut eng = Engine::create(EngineConfig::small().with_profiling())
        .expect("engine should be created");

    eng.enter(CodeAddr::of(&PROFILED_OUTER), false);

    let outer = CodeAddr::of(&PROFILED_OUTER);
    let answer = CodeAddr::of(&ANSWER);
    assert_eq!(eng.profiler().call_count(outer, answer), 2);
    assert_eq!(eng.profiler().call_pairs().count(), 1);
    assert_eq!(eng.profiler().current_proc(), None);
}

#[test]
fn test_profiling_off_records_nothing() {
    let mut eng = engine();
    set_args(&mut eng, 1, 3);

    eng.enter(CodeAddr::of(&RANGE), false);

    assert_eq!(eng.profiler().current_proc(), None);
    assert_eq!(eng.profiler().call_pairs().count(), 0);
}
