//! HookCrab Interpreter Library
//!
//! An interpreter for a small typed, SSA-flavoured IR whose execution loop can
//! be instrumented one instruction at a time.
//!
//! Programs are parsed and fully materialized by [`loader`] before anything
//! runs. [`ExtensibleInterpreter`] then fetches instructions from the top
//! frame of its call stack and hands each one to an [`ExecutionHook`]. The
//! default hook forwards to the [`BaseEvaluator`], which owns the standard
//! semantics of every instruction.
//!
//! ```ignore
//! let ctx = Context::new();
//! let program = loader::parse_program(&ctx, "demo", source)?;
//! let mut interp = ExtensibleInterpreter::new(&ctx, program, InstructionCounter::new());
//! let status = interp.run_main(&["demo".to_string()], &[])?;
//! println!("{status}\n{}", interp.hook());
//! ```

pub mod context;
pub mod error;
pub mod hook;
pub mod interpreter;
pub mod loader;
pub mod program;
pub mod runner;
pub mod stack;
pub mod ty;
pub mod value;

pub use context::Context;
pub use error::{InterpError, LoadError};
pub use hook::{EvalContext, ExecutionHook, Forward, InstructionCounter, Observe, Replace, Tracer};
pub use interpreter::{BaseEvaluator, ExtensibleInterpreter};
pub use program::Program;
pub use value::{TypedValue, Value};

use anyhow::{Result, bail};

/// Execute a specific function by name.
///
/// The function must take no arguments.
///
/// # Returns
/// * `Ok(TypedValue)` - Function executed successfully, returns the result value
/// * `Err(anyhow::Error)` - Function not found, has arguments, or execution failed
pub fn run_function<H: ExecutionHook>(
    interpreter: &mut ExtensibleInterpreter<H>,
    fn_name: &str,
) -> Result<TypedValue> {
    let func = interpreter
        .program()
        .get_function(fn_name)
        .ok_or_else(|| InterpError::FunctionNotFound(fn_name.to_string()))?;

    let arg_count = interpreter.program().function(func).arity();
    if arg_count > 0 {
        bail!(
            "Function '{}' takes {} arguments, only zero-argument functions are supported",
            fn_name,
            arg_count
        );
    }

    interpreter.run_function_by_name(fn_name, &[])
}
