//! Choice points, redo and exhaustion across call boundaries

mod common;

use common::{engine, result, set_args, FAILS, RANGE, SUM_RANGE};
use nondet_vm::{
    CodeAddr, DirectDispatch, Dispatch, Engine, Label, Primitive, Trampoline, Transfer, TRUE,
};

#[test]
fn test_fail_driven_sum() {
    let mut eng = engine();
    set_args(&mut eng, 1, 10);

    assert_eq!(eng.enter(CodeAddr::of(&SUM_RANGE), false), None);
    assert_eq!(result(&eng), Some(55));
    assert_eq!(eng.nondet_depth(), 0);
}

#[test]
fn test_fail_driven_sum_of_empty_range() {
    let mut eng = engine();
    set_args(&mut eng, 5, 4);

    eng.enter(CodeAddr::of(&SUM_RANGE), false);
    assert_eq!(result(&eng), Some(0));
}

#[test]
fn test_host_enumerates_solutions_with_redo() {
    let mut eng = engine();
    set_args(&mut eng, 3, 6);

    let mut solutions = Vec::new();
    eng.enter(CodeAddr::of(&RANGE), false);
    while let Some(n) = result(&eng) {
        solutions.push(n);
        eng.enter(Primitive::Redo.addr(), false);
    }

    assert_eq!(solutions, vec![3, 4, 5, 6]);
    assert_eq!(eng.nondet_depth(), 0);
}

#[test]
fn test_no_solutions() {
    let mut eng = engine();
    set_args(&mut eng, 2, 1);

    eng.enter(CodeAddr::of(&RANGE), false);
    assert_eq!(result(&eng), None);

    eng.enter(CodeAddr::of(&FAILS), false);
    assert_eq!(result(&eng), None);
}

#[test]
fn test_retained_choice_point_survives_other_calls() {
    let mut eng = engine();
    set_args(&mut eng, 1, 3);
    eng.enter(CodeAddr::of(&RANGE), false);
    assert_eq!(result(&eng), Some(1));

    // A complete call in between leaves the earlier choice point alone.
    set_args(&mut eng, 1, 4);
    eng.enter(CodeAddr::of(&SUM_RANGE), false);
    assert_eq!(result(&eng), Some(10));
    assert_eq!(eng.nondet_depth(), 1);

    eng.enter(Primitive::Redo.addr(), false);
    assert_eq!(result(&eng), Some(2));
}

#[test]
fn test_strategies_enumerate_the_same_solutions() {
    fn enumerate<const DIRECT: bool>(eng: &mut Engine) -> Vec<usize> {
        let run = |eng: &mut Engine, entry| {
            if DIRECT {
                eng.enter_with::<DirectDispatch>(entry, false)
            } else {
                eng.enter_with::<Trampoline>(entry, false)
            }
        };
        let mut out = Vec::new();
        run(eng, CodeAddr::of(&RANGE));
        while let Some(n) = result(eng) {
            out.push(n);
            run(eng, Primitive::Redo.addr());
        }
        out
    }

    let mut a = engine();
    let mut b = engine();
    set_args(&mut a, 10, 20);
    set_args(&mut b, 10, 20);

    assert_eq!(enumerate::<false>(&mut a), enumerate::<true>(&mut b));
    assert_eq!(a.shadow().args(), b.shadow().args());
}

// A guest procedure with its own choice point calls host code, which runs a
// nested call that fails. The nested failure must stop at the nested
// boundary's floor instead of retrying the outer procedure's frame.

static FLOOR_OUTER: Label = Label::new("floor_outer", floor_outer);
static FLOOR_OUTER_RETRY: Label = Label::new("floor_outer_retry", floor_outer_retry);

fn floor_outer(eng: &mut Engine) -> Transfer {
    eng.mkframe("floor_outer", 0, CodeAddr::of(&FLOOR_OUTER_RETRY));
    let inner_r1 = eng.call_foreign(|eng| {
        eng.enter(CodeAddr::of(&FAILS), false);
        eng.shadow().r(1)
    });
    eng.set_r(3, inner_r1);
    eng.set_r(1, TRUE);
    eng.set_r(2, 1);
    eng.succeed()
}

fn floor_outer_retry(eng: &mut Engine) -> Transfer {
    eng.set_r(1, TRUE);
    eng.set_r(2, 2);
    eng.succeed_discard()
}

#[test]
fn test_nested_failure_stops_at_boundary_floor() {
    let mut eng = engine();

    eng.enter(CodeAddr::of(&FLOOR_OUTER), false);

    assert_eq!(result(&eng), Some(1));
    assert_eq!(eng.shadow().r(3), nondet_vm::FALSE);
    assert_eq!(eng.nondet_depth(), 1);

    eng.enter(Primitive::Redo.addr(), false);
    assert_eq!(result(&eng), Some(2));
    assert_eq!(eng.nondet_depth(), 0);
}

// Entering at do_fail drops the top frame and retries the one below it,
// even when that frame was left by an earlier call.

#[test]
fn test_enter_at_fail_falls_through_to_older_frame() {
    let mut eng = engine();
    set_args(&mut eng, 1, 3);
    eng.enter(CodeAddr::of(&RANGE), false);
    set_args(&mut eng, 7, 9);
    eng.enter(CodeAddr::of(&RANGE), false);
    assert_eq!(eng.nondet_depth(), 2);

    eng.enter(Primitive::Fail.addr(), false);
    assert_eq!(result(&eng), Some(2));
    assert_eq!(eng.nondet_depth(), 1);

    eng.enter(Primitive::Redo.addr(), false);
    assert_eq!(result(&eng), Some(3));
    assert_eq!(eng.nondet_depth(), 0);

    eng.enter(Primitive::Redo.addr(), false);
    assert_eq!(result(&eng), None);
}

// pairs: x in 1..=2, y in 1..=3, rejects y == 3 and yields r2 = 10x + y.
// Each variable has its own frame, so once y runs out the host's next redo
// has to reach the x frame underneath it.

static PAIRS: Label = Label::new("pairs", pairs);
static PAIRS_X_NEXT: Label = Label::new("pairs_x_next", pairs_x_next);
static PAIRS_Y: Label = Label::new("pairs_y", pairs_y);
static PAIRS_Y_NEXT: Label = Label::new("pairs_y_next", pairs_y_next);
static PAIRS_TEST: Label = Label::new("pairs_test", pairs_test);

fn pairs(eng: &mut Engine) -> Transfer {
    eng.mkframe("pairs_x", 1, CodeAddr::of(&PAIRS_X_NEXT));
    eng.set_framevar(1, 1);
    eng.set_r(5, 1);
    Transfer::Jump(CodeAddr::of(&PAIRS_Y))
}

fn pairs_x_next(eng: &mut Engine) -> Transfer {
    let x = eng.framevar(1) + 1;
    eng.set_framevar(1, x);
    if x == 2 {
        eng.set_redoip(Primitive::Fail.addr());
    }
    eng.set_r(5, x);
    Transfer::Jump(CodeAddr::of(&PAIRS_Y))
}

fn pairs_y(eng: &mut Engine) -> Transfer {
    let x = eng.r(5);
    eng.mkframe("pairs_y", 2, CodeAddr::of(&PAIRS_Y_NEXT));
    eng.set_framevar(1, x);
    eng.set_framevar(2, 1);
    Transfer::Jump(CodeAddr::of(&PAIRS_TEST))
}

fn pairs_y_next(eng: &mut Engine) -> Transfer {
    let y = eng.framevar(2) + 1;
    eng.set_framevar(2, y);
    if y == 3 {
        eng.set_redoip(Primitive::Fail.addr());
    }
    Transfer::Jump(CodeAddr::of(&PAIRS_TEST))
}

fn pairs_test(eng: &mut Engine) -> Transfer {
    let (x, y) = (eng.framevar(1), eng.framevar(2));
    if y == 3 {
        return eng.fail();
    }
    eng.set_r(1, TRUE);
    eng.set_r(2, 10 * x + y);
    eng.succeed()
}

fn enumerate_pairs<D: Dispatch>() -> (Vec<usize>, usize) {
    let mut eng = engine();
    let mut solutions = Vec::new();
    eng.enter_with::<D>(CodeAddr::of(&PAIRS), false);
    while let Some(n) = result(&eng) {
        solutions.push(n);
        eng.enter_with::<D>(Primitive::Redo.addr(), false);
    }
    (solutions, eng.nondet_depth())
}

#[test]
fn test_host_redo_backtracks_into_older_choice_points() {
    let (trampoline, depth) = enumerate_pairs::<Trampoline>();
    assert_eq!(trampoline, vec![11, 12, 21, 22]);
    assert_eq!(depth, 0);

    let (direct, depth) = enumerate_pairs::<DirectDispatch>();
    assert_eq!(direct, vec![11, 12, 21, 22]);
    assert_eq!(depth, 0);
}
