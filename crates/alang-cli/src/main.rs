//! Thin host binary that runs an `.alang` file to completion, draining the
//! event loop once the top-level script returns.
//!
//! Grounded in `ouros-cli`'s main (read file, construct the runner, run,
//! report elapsed time and errors via `ExitCode`), with argument parsing
//! done through `clap` derive rather than hand-parsed `env::args()` — the
//! teacher's own CLI also drives a type checker ALang has no counterpart
//! for, so this surface is new and grounded in the wider retrieved pack
//! instead of forced into the teacher's narrower shape.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use alang::{Engine, EngineConfig};
use clap::Parser as ClapParser;

/// Run an ALang script file.
#[derive(ClapParser, Debug)]
#[command(name = "alang", version, about = "Run an ALang script")]
struct Cli {
    /// Path to the `.alang` source file to run.
    file: PathBuf,

    /// Base directory file imports resolve relative paths against.
    /// Defaults to the script file's own directory.
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Enable verbose (debug-level) tracing output on stderr.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match std::fs::read_to_string(&cli.file) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error reading {}: {err}", cli.file.display());
            return ExitCode::FAILURE;
        }
    };

    let base_dir = cli.base_dir.or_else(|| cli.file.parent().map(PathBuf::from)).unwrap_or_else(|| PathBuf::from("."));
    let mut engine = Engine::new(EngineConfig { import_base_dir: base_dir, ..EngineConfig::default() });
    engine.initialize();

    let start = Instant::now();
    let result = engine.execute(&code);
    match result {
        Ok(_) => {
            engine.run_event_loop_until_idle();
            eprintln!("success after {:?}", start.elapsed());
            ExitCode::SUCCESS
        }
        Err(exc) => {
            eprintln!("error after {:?}\n{exc}", start.elapsed());
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::new(filter)).with_writer(std::io::stderr).init();
}
