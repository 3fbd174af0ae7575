//! Dispatch strategies, debug flags, configuration and per-thread engines

mod common;

use std::io;
use std::sync::Arc;

use common::{engine, result, set_args, ANSWER, SUM_RANGE};
use nondet_vm::engine::{finalize_thread_engine, init_thread_engine, with_thread_engine};
use nondet_vm::{
    debug_flags, CodeAddr, ConfigError, DebugFlag, DirectDispatch, Dispatch, Engine,
    EngineConfig, EngineError, Trampoline,
};
use parking_lot::Mutex;

fn sum_with<D: Dispatch>(lo: usize, hi: usize) -> (Option<usize>, Engine) {
    let mut eng = engine();
    set_args(&mut eng, lo, hi);
    eng.enter_with::<D>(CodeAddr::of(&SUM_RANGE), false);
    (result(&eng), eng)
}

#[test]
fn test_strategies_agree_on_long_chains() {
    for hi in [0, 1, 7, 8, 9, 100, 1000] {
        let (a, eng_a) = sum_with::<Trampoline>(1, hi);
        let (b, eng_b) = sum_with::<DirectDispatch>(1, hi);
        assert_eq!(a, Some(hi * (hi + 1) / 2), "trampoline, hi = {}", hi);
        assert_eq!(a, b, "hi = {}", hi);
        assert_eq!(eng_a.shadow().args(), eng_b.shadow().args());
    }
}

#[test]
fn test_strategy_names() {
    assert_eq!(Trampoline::NAME, "trampoline");
    assert_eq!(DirectDispatch::NAME, "direct");
}

#[test]
fn test_trace_flag_keeps_last_locations() {
    let mut eng = engine();
    eng.set_debug_flag(DebugFlag::Trace, true);
    set_args(&mut eng, 1, 100);

    eng.enter_with::<Trampoline>(CodeAddr::of(&SUM_RANGE), false);

    let names: Vec<_> = eng.prev_locations().map(|pc| pc.name()).collect();
    assert_eq!(names.len(), nondet_vm::engine::NUM_PREV_LOCATIONS);
    assert_eq!(names.last(), Some(&"engine_done"));
    assert!(names.contains(&"range_next"));
    assert!(names.contains(&"sum_range_done"));
    eng.dump_prev_locations();
}

#[test]
fn test_goto_flag_records_too() {
    let mut eng = engine();
    eng.set_debug_flag(DebugFlag::Goto, true);
    set_args(&mut eng, 1, 2);

    eng.enter_with::<Trampoline>(CodeAddr::of(&ANSWER), false);

    assert_eq!(eng.prev_locations().count(), 2);
}

#[test]
fn test_write_prev_locations_lists_recorded_blocks() {
    let mut eng = engine();
    let mut out = Vec::new();
    eng.write_prev_locations(&mut out).expect("write to a Vec");
    assert!(out.is_empty());

    eng.set_debug_flag(DebugFlag::Trace, true);
    set_args(&mut eng, 1, 2);
    eng.enter_with::<Trampoline>(CodeAddr::of(&ANSWER), false);
    eng.write_prev_locations(&mut out).expect("write to a Vec");

    let text = String::from_utf8(out).expect("trace is utf-8");
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(
        lines[0],
        format!("previous {} locations:", nondet_vm::engine::NUM_PREV_LOCATIONS)
    );
    assert!(lines[1].contains("answer"));
    assert!(lines[2].contains("engine_done"));
}

/// Log sink shared between a test and the subscriber writing into it.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

fn logged_calls(call_flag: bool) -> String {
    let mut eng = engine();
    eng.set_debug_flag(DebugFlag::Call, call_flag);
    set_args(&mut eng, 1, 2);

    let captured = Captured::default();
    let sink = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || sink.clone())
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .finish();
    tracing::subscriber::with_default(subscriber, || {
        eng.enter(CodeAddr::of(&ANSWER), false);
    });
    assert_eq!(result(&eng), Some(3));
    captured.text()
}

#[test]
fn test_call_flag_logs_boundary_entry_and_return() {
    let text = logged_calls(true);
    assert!(text.contains("nondet_vm::call"), "{}", text);
    assert!(text.contains("entry=answer"), "{}", text);
    assert!(text.contains("return"), "{}", text);

    let quiet = logged_calls(false);
    assert!(!quiet.contains("nondet_vm::call"), "{}", quiet);
}

#[test]
fn test_direct_dispatch_never_runs_done_block() {
    let mut eng = engine();
    eng.set_debug_flag(DebugFlag::Trace, true);
    set_args(&mut eng, 1, 2);

    eng.enter_with::<DirectDispatch>(CodeAddr::of(&ANSWER), false);

    assert_eq!(result(&eng), Some(3));
    assert_eq!(eng.prev_locations().count(), 0);
}

#[test]
fn test_engine_flags_are_independent() {
    let mut a = engine();
    let b = engine();
    a.set_debug_flag(DebugFlag::Heap, true);

    assert!(a.debug_flags().is_set(DebugFlag::Heap));
    assert!(!b.debug_flags().is_set(DebugFlag::Heap));
    assert!(!debug_flags::defaults().is_set(DebugFlag::Heap));
}

#[test]
fn test_engine_from_toml_config() {
    let config = EngineConfig::from_toml_str(
        r#"
        heap_size = 2048
        heap_redzone = 16
        nondet_stack_size = 128
        nondet_stack_redzone = 4
        context_name = "worker"
        profile_time = true
        "#,
    )
    .expect("config should parse");

    let eng = Engine::create(config).expect("engine should be created");
    assert_eq!(eng.heap().bounds().len(), 2048);
    assert_eq!(eng.context().name(), "worker");
    assert_eq!(eng.config().det_stack_size, EngineConfig::default().det_stack_size);
    eng.destroy();
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut config = EngineConfig::small();
    config.trail_redzone = config.trail_size;

    match Engine::create(config) {
        Err(EngineError::Config(ConfigError::ZoneSize { zone, .. })) => assert_eq!(zone, "trail"),
        other => panic!("expected a zone size error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_allocator_budget_is_reported() {
    let allocator = std::sync::Arc::new(nondet_vm::SystemZoneAllocator::with_budget(100));

    match Engine::create_with_allocator(EngineConfig::small(), allocator) {
        Err(EngineError::Zone(nondet_vm::ZoneError::Exhausted { zone, .. })) => {
            assert_eq!(zone, "heap")
        }
        other => panic!("expected an exhausted allocator, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_thread_engine_lifecycle() {
    std::thread::spawn(|| {
        assert_eq!(with_thread_engine(|_| ()), None);
        assert!(init_thread_engine(EngineConfig::small()).expect("engine should be created"));
        assert!(!init_thread_engine(EngineConfig::small()).expect("second init is a no-op"));

        let sum = with_thread_engine(|eng| {
            set_args(eng, 1, 4);
            eng.enter(CodeAddr::of(&SUM_RANGE), false);
            result(eng)
        });
        assert_eq!(sum, Some(Some(10)));

        assert!(finalize_thread_engine());
        assert!(!finalize_thread_engine());
    })
    .join()
    .expect("thread should finish");
}
