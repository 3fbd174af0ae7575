//! Shared guest programs and helpers for integration tests
//!
//! Register conventions used by the programs below:
//! - r1: TRUE/FALSE success flag
//! - r2: result
//! - r3, r4: inputs

#![allow(dead_code)]

use nondet_vm::{
    CodeAddr, Engine, EngineConfig, ExceptionValue, Label, Primitive, Transfer, FALSE, TRUE,
};

/// Install a test subscriber once. Set `RUST_LOG` to see engine logs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// An engine with small zones.
pub fn engine() -> Engine {
    init_tracing();
    Engine::create(EngineConfig::small()).expect("engine should be created")
}

// range(r3, r4): yields r2 = r3, r3 + 1, ..., r4. No solutions if r3 > r4.

pub static RANGE: Label = Label::new("range", range);
static RANGE_NEXT: Label = Label::new("range_next", range_next);

fn range(eng: &mut Engine) -> Transfer {
    let (lo, hi) = (eng.r(3), eng.r(4));
    if lo > hi {
        return eng.redo();
    }
    eng.mkframe("range", 2, CodeAddr::of(&RANGE_NEXT));
    eng.set_framevar(1, lo);
    eng.set_framevar(2, hi);
    yield_range(eng, lo, hi)
}

fn range_next(eng: &mut Engine) -> Transfer {
    let n = eng.framevar(1) + 1;
    eng.set_framevar(1, n);
    let hi = eng.framevar(2);
    yield_range(eng, n, hi)
}

fn yield_range(eng: &mut Engine, n: usize, hi: usize) -> Transfer {
    eng.set_r(1, TRUE);
    eng.set_r(2, n);
    if n == hi {
        eng.succeed_discard()
    } else {
        eng.succeed()
    }
}

// sum_range(r3, r4): r2 = sum of every solution of range(r3, r4), collected
// by failing back into range until it is exhausted.

pub static SUM_RANGE: Label = Label::new("sum_range", sum_range);
static SUM_RANGE_NEXT: Label = Label::new("sum_range_next", sum_range_next);
static SUM_RANGE_DONE: Label = Label::new("sum_range_done", sum_range_done);

fn sum_range(eng: &mut Engine) -> Transfer {
    eng.mkframe("sum_range", 1, CodeAddr::of(&SUM_RANGE_DONE));
    eng.set_framevar(1, 0);
    eng.call(CodeAddr::of(&RANGE), CodeAddr::of(&SUM_RANGE_NEXT))
}

fn sum_range_next(eng: &mut Engine) -> Transfer {
    let total = eng.framevar(1) + eng.r(2);
    eng.set_framevar(1, total);
    eng.redo()
}

fn sum_range_done(eng: &mut Engine) -> Transfer {
    eng.set_r(1, TRUE);
    eng.set_r(2, eng.framevar(1));
    eng.succeed_discard()
}

// fails: pushes a frame and fails out of it.

pub static FAILS: Label = Label::new("fails", fails);

fn fails(eng: &mut Engine) -> Transfer {
    eng.mkframe("fails", 0, Primitive::Fail.addr());
    eng.fail()
}

// throw_after_assign: sets heap cell r4 to 99 (trailed), grows the det stack,
// pushes a frame and throws exception(r3).

pub static THROW_AFTER_ASSIGN: Label = Label::new("throw_after_assign", throw_after_assign);

fn throw_after_assign(eng: &mut Engine) -> Transfer {
    let (value, cell) = (eng.r(3), eng.r(4));
    eng.trail_assign(cell, 99);
    eng.incr_sp(4);
    eng.mkframe("throw_after_assign", 0, Primitive::Fail.addr());
    eng.throw(ExceptionValue::new(value))
}

// answer: r1 = TRUE, r2 = r3 + r4.

pub static ANSWER: Label = Label::new("answer", answer);

fn answer(eng: &mut Engine) -> Transfer {
    let sum = eng.r(3) + eng.r(4);
    eng.set_r(1, TRUE);
    eng.set_r(2, sum);
    eng.proceed()
}

/// Load range/sum arguments into the shadow registers.
pub fn set_args(eng: &mut Engine, a: usize, b: usize) {
    let regs = eng.shadow_mut();
    regs.set_r(3, a);
    regs.set_r(4, b);
}

/// Result register of the shadow copy, or `None` if r1 is FALSE.
pub fn result(eng: &Engine) -> Option<usize> {
    match eng.shadow().r(1) {
        FALSE => None,
        _ => Some(eng.shadow().r(2)),
    }
}
