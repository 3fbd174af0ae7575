/// nondet-vm - N-queens driver for the engine
///
/// Runs a guest program that enumerates every placement of N queens by
/// backtracking through nondet frames, and reports how many it found.
use nondet_vm::debug_flags;
use nondet_vm::{
    CodeAddr, DebugFlag, DirectDispatch, Engine, EngineConfig, Label, Trampoline, Transfer,
    Word, TRUE,
};
use std::env;
use std::fs;
use std::io;
use std::process;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_usage() {
    eprintln!("nondet-vm v{}", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    nondet-vm [OPTIONS] [N]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -h, --help               Print this help message");
    eprintln!("    -v, --version            Print version information");
    eprintln!("    --config <FILE>          Load engine configuration from a TOML file");
    eprintln!("    --strategy <NAME>        Dispatch strategy: trampoline (default) or direct");
    eprintln!("    --trace                  Record recent blocks and print them at the end");
    eprintln!();
    eprintln!("ARGUMENTS:");
    eprintln!("    <N>                      Board size (default: 8)");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    RUST_LOG                 Log filter (default: warn,nondet_vm=info)");
    eprintln!("    NONDET_VM_DEBUG          Comma-separated debug flags: goto, call, trace");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Trampoline,
    Direct,
}

struct Options {
    size: usize,
    config: Option<String>,
    strategy: Strategy,
    trace: bool,
}

fn parse_args() -> Result<Options, String> {
    let args: Vec<String> = env::args().collect();

    let mut options = Options {
        size: 8,
        config: None,
        strategy: Strategy::Trampoline,
        trace: false,
    };
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                process::exit(0);
            }
            "-v" | "--version" => {
                println!("nondet-vm {}", VERSION);
                process::exit(0);
            }
            "--config" => {
                i += 1;
                let path = args.get(i).ok_or("--config requires a file argument")?;
                options.config = Some(path.clone());
            }
            "--strategy" => {
                i += 1;
                options.strategy = match args.get(i).map(String::as_str) {
                    Some("trampoline") => Strategy::Trampoline,
                    Some("direct") => Strategy::Direct,
                    Some(other) => return Err(format!("Unknown strategy: {}", other)),
                    None => return Err("--strategy requires an argument".to_string()),
                };
            }
            "--trace" => options.trace = true,
            arg if arg.starts_with('-') => return Err(format!("Unknown option: {}", arg)),
            arg => {
                options.size = arg
                    .parse()
                    .map_err(|_| format!("Invalid board size: {}", arg))?;
            }
        }
        i += 1;
    }

    Ok(options)
}

// Guest program. Parameters live in registers the blocks never overwrite:
// r10 = N, r11 = board (N cells, column of the queen in each row),
// r12 = solution counter cell, r13 = copy of the first solution (N cells).
// r5 carries the row being placed.

const R_ROW: usize = 5;
const R_SIZE: usize = 10;
const R_BOARD: usize = 11;
const R_COUNT: usize = 12;
const R_FIRST: usize = 13;

static QUEENS: Label = Label::new("queens", queens);
static QUEENS_DONE: Label = Label::new("queens_done", queens_done);
static PLACE: Label = Label::new("place", place);
static PLACE_TRY: Label = Label::new("place_try", place_try);
static PLACE_NEXT: Label = Label::new("place_next", place_next);

fn queens(eng: &mut Engine) -> Transfer {
    eng.mkframe("queens", 0, CodeAddr::of(&QUEENS_DONE));
    eng.set_r(R_ROW, 0);
    Transfer::Jump(CodeAddr::of(&PLACE))
}

fn queens_done(eng: &mut Engine) -> Transfer {
    eng.set_r(1, TRUE);
    eng.set_r(2, eng.heap_get(eng.r(R_COUNT)));
    eng.succeed_discard()
}

fn place(eng: &mut Engine) -> Transfer {
    let row = eng.r(R_ROW);
    let size = eng.r(R_SIZE);
    if row == size {
        record_solution(eng, size);
        return eng.redo();
    }
    eng.mkframe("place", 2, CodeAddr::of(&PLACE_NEXT));
    eng.set_framevar(1, row);
    eng.set_framevar(2, 0);
    Transfer::Jump(CodeAddr::of(&PLACE_TRY))
}

fn place_try(eng: &mut Engine) -> Transfer {
    let size = eng.r(R_SIZE);
    let board = eng.r(R_BOARD);
    let row = eng.framevar(1);
    let mut col = eng.framevar(2);

    while col < size {
        if is_safe(eng, board, row, col) {
            eng.set_framevar(2, col);
            eng.heap_set(board + row, col);
            eng.set_r(R_ROW, row + 1);
            return Transfer::Jump(CodeAddr::of(&PLACE));
        }
        col += 1;
    }
    eng.fail()
}

fn place_next(eng: &mut Engine) -> Transfer {
    let col = eng.framevar(2) + 1;
    eng.set_framevar(2, col);
    Transfer::Jump(CodeAddr::of(&PLACE_TRY))
}

fn is_safe(eng: &Engine, board: Word, row: Word, col: Word) -> bool {
    (0..row).all(|r| {
        let c = eng.heap_get(board + r);
        c != col && c.abs_diff(col) != row - r
    })
}

fn record_solution(eng: &mut Engine, size: usize) {
    let counter = eng.r(R_COUNT);
    let count = eng.heap_get(counter) + 1;
    eng.heap_set(counter, count);
    if count == 1 {
        let (board, first) = (eng.r(R_BOARD), eng.r(R_FIRST));
        for i in 0..size {
            let col = eng.heap_get(board + i);
            eng.heap_set(first + i, col);
        }
    }
}

fn load_config(path: Option<&str>) -> Result<EngineConfig, String> {
    match path {
        Some(path) => {
            let source = fs::read_to_string(path)
                .map_err(|e| format!("Error reading {}: {}", path, e))?;
            EngineConfig::from_toml_str(&source).map_err(|e| format!("{}: {}", path, e))
        }
        None => Ok(EngineConfig::default()),
    }
}

fn run(options: &Options) -> Result<(), String> {
    debug_flags::init_from_env().map_err(|e| e.to_string())?;
    let config = load_config(options.config.as_deref())?;
    let mut eng = Engine::create(config).map_err(|e| e.to_string())?;
    if options.trace {
        eng.set_debug_flag(DebugFlag::Trace, true);
    }

    let size = options.size;
    let board = eng.host_alloc(size);
    let counter = eng.host_alloc(1);
    let first = eng.host_alloc(size);
    eng.heap_set(counter, 0);

    let regs = eng.shadow_mut();
    regs.set_r(R_SIZE, size);
    regs.set_r(R_BOARD, board);
    regs.set_r(R_COUNT, counter);
    regs.set_r(R_FIRST, first);

    let entry = CodeAddr::of(&QUEENS);
    let caught = match options.strategy {
        Strategy::Trampoline => eng.enter_with::<Trampoline>(entry, true),
        Strategy::Direct => eng.enter_with::<DirectDispatch>(entry, true),
    };
    if let Some(exception) = caught {
        return Err(format!("Guest program raised {}", exception));
    }

    let solutions = eng.shadow().r(2);
    println!("{}-queens: {} solutions", size, solutions);
    if solutions > 0 {
        let cols: Vec<String> = (0..size)
            .map(|i| eng.heap_get(first + i).to_string())
            .collect();
        println!("first: [{}]", cols.join(", "));
    }
    if options.trace {
        eng.write_prev_locations(&mut io::stdout().lock())
            .map_err(|e| format!("Error writing trace: {}", e))?;
    }

    eng.destroy();
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn,nondet_vm=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let options = match parse_args() {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = run(&options) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
