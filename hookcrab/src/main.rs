//! HookCrab Interpreter
//!
//! Loads a textual IR program, runs its entry function through the
//! instrumentable execution loop and exits with the program's status.

use clap::{Parser, ValueEnum};
use hookcrab::interpreter::exit_status;
use hookcrab::runner::{self, FAILURE_STATUS};
use hookcrab::{Context, ExecutionHook, Forward, InstructionCounter, Tracer};
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "hookcrab", version)]
#[command(about = "Instrumentable interpreter for a small typed IR")]
struct Cli {
    /// Instrumentation to run on every executed instruction
    #[arg(long, value_enum, default_value_t = HookKind::Trace)]
    hook: HookKind,

    /// Run this zero-argument function instead of `main`
    #[arg(long, value_name = "NAME")]
    start: Option<String>,

    /// IR file to run (`-` or nothing for stdin), followed by the arguments
    /// forwarded verbatim to the program
    #[arg(
        value_name = "PROGRAM [ARGS]...",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    command: Vec<String>,
}

impl Cli {
    fn program(&self) -> &str {
        self.command.first().map_or("-", String::as_str)
    }

    fn program_args(&self) -> &[String] {
        self.command.get(1..).unwrap_or_default()
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum HookKind {
    /// Print each instruction to stderr before executing it
    Trace,
    /// Print a per-opcode histogram to stderr after the run
    Count,
    /// No instrumentation
    #[value(name = "none")]
    Off,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = std::env::var("HOOKCRAB_LOG").unwrap_or_else(|_| "warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .init();

    info!("HookCrab Interpreter v{}", env!("CARGO_PKG_VERSION"));

    let ctx = Context::new();
    let status = match cli.hook {
        HookKind::Trace => run(&ctx, &cli, Tracer::stderr()),
        HookKind::Count => {
            let mut counter = InstructionCounter::new();
            let status = run(&ctx, &cli, &mut counter);
            eprintln!("{counter}");
            status
        }
        HookKind::Off => run(&ctx, &cli, Forward),
    };

    info!("Exiting with status {}", status);
    ExitCode::from(status as u8)
}

fn run<H: ExecutionHook>(ctx: &Context, cli: &Cli, hook: H) -> i32 {
    let Some(start) = &cli.start else {
        let env: Vec<String> = std::env::vars_os()
            .map(|(key, value)| format!("{}={}", key.to_string_lossy(), value.to_string_lossy()))
            .collect();
        return runner::interpret(ctx, cli.program(), cli.program_args(), &env, hook);
    };

    let result = runner::run_start(ctx, cli.program(), start, hook).and_then(|value| {
        println!("{value}");
        exit_status(&value)
    });
    match result {
        Ok(status) => status,
        Err(e) => {
            error!("Interpretation failed: {:#}", e);
            FAILURE_STATUS
        }
    }
}
