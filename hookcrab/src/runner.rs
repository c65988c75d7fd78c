//! Load-and-run entry points shared by the binary and the tests.
use crate::context::Context;
use crate::hook::ExecutionHook;
use crate::interpreter::ExtensibleInterpreter;
use crate::loader;
use crate::value::TypedValue;
use anyhow::Result;
use std::path::Path;
use tracing::error;

/// Status reported when the program cannot be loaded or run to completion.
pub const FAILURE_STATUS: i32 = -1;

/// Derives `argv[0]` from the program path.
///
/// A trailing `.xx` suffix of exactly two ASCII letters (`.ll`, `.bc`, ...)
/// is removed. Anything else is kept as is.
pub fn program_name(path: &str) -> String {
    let has_short_suffix = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.len() == 2 && ext.bytes().all(|b| b.is_ascii_alphabetic()));
    if has_short_suffix {
        path[..path.len() - 3].to_string()
    } else {
        path.to_string()
    }
}

/// Loads `path` and runs its `main`, returning the process exit status.
///
/// `args` are the program's arguments without `argv[0]`, which is derived
/// from `path`. Every failure is logged and reported as [`FAILURE_STATUS`].
pub fn interpret<H: ExecutionHook>(
    ctx: &Context,
    path: &str,
    args: &[String],
    env: &[String],
    hook: H,
) -> i32 {
    let program = match loader::load_file(ctx, path) {
        Ok(program) => program,
        Err(e) => {
            error!("Failed to load program: {}", e);
            return FAILURE_STATUS;
        }
    };

    let argv: Vec<String> = std::iter::once(program_name(path))
        .chain(args.iter().cloned())
        .collect();

    let mut interpreter = ExtensibleInterpreter::new(ctx, program, hook);
    match interpreter.run_main(&argv, env) {
        Ok(status) => status,
        Err(e) => {
            error!("Interpretation failed: {:#}", e);
            FAILURE_STATUS
        }
    }
}

/// Loads `path` and runs the zero-argument function `start`.
pub fn run_start<H: ExecutionHook>(
    ctx: &Context,
    path: &str,
    start: &str,
    hook: H,
) -> Result<TypedValue> {
    let program = loader::load_file(ctx, path)?;
    let mut interpreter = ExtensibleInterpreter::new(ctx, program, hook);
    let result = crate::run_function(&mut interpreter, start)?;
    interpreter.evaluator_mut().flush_output()?;
    Ok(result)
}
