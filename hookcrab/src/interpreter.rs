//! The extensible execution loop.
//!
//! [`ExtensibleInterpreter`] repeatedly fetches the instruction under the top
//! frame's cursor, advances the cursor, and dispatches the instruction to its
//! [`ExecutionHook`]. The loop ends when the call stack is empty or when
//! dispatch reports a fault.

mod builtins;
pub mod evaluator;
mod function;
mod place;
mod rvalue;

pub use builtins::BUILTINS;
pub use evaluator::BaseEvaluator;

use crate::context::Context;
use crate::error::InterpError;
use crate::hook::{EvalContext, ExecutionHook, Forward};
use crate::program::{Function, Program};
use crate::ty::Type;
use crate::value::TypedValue;
use anyhow::{Result, anyhow};
use tracing::{debug, info};

/// Name of the function [`ExtensibleInterpreter::run_main`] starts from.
pub const ENTRY_FUNCTION: &str = "main";

#[derive(Debug)]
pub struct ExtensibleInterpreter<H = Forward> {
    program: Program,
    evaluator: BaseEvaluator,
    hook: H,
}

impl<H: ExecutionHook> ExtensibleInterpreter<H> {
    pub fn new(ctx: &Context, program: Program, hook: H) -> Self {
        Self::with_evaluator(program, BaseEvaluator::new(ctx), hook)
    }

    /// Builds an interpreter around an already configured evaluator, e.g. one
    /// writing program output somewhere other than stdout.
    pub fn with_evaluator(program: Program, evaluator: BaseEvaluator, hook: H) -> Self {
        info!("Created interpreter for `{}`", program.name());
        Self {
            program,
            evaluator,
            hook,
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn evaluator(&self) -> &BaseEvaluator {
        &self.evaluator
    }

    pub fn evaluator_mut(&mut self) -> &mut BaseEvaluator {
        &mut self.evaluator
    }

    pub fn hook(&self) -> &H {
        &self.hook
    }

    pub fn hook_mut(&mut self) -> &mut H {
        &mut self.hook
    }

    pub fn into_parts(self) -> (Program, BaseEvaluator, H) {
        (self.program, self.evaluator, self.hook)
    }

    /// Executes instructions until the call stack is empty.
    ///
    /// The cursor is advanced before the hook runs, so a control transfer made
    /// by the instruction overrides the sequential advance. A fault leaves the
    /// stack as it was when the fault occurred; see [`Self::reset`].
    pub fn run(&mut self) -> Result<()> {
        while let Some(frame) = self.evaluator.stack_mut().top_mut() {
            let loc = frame.advance();
            let instr = self.program.instruction(loc).ok_or_else(|| {
                anyhow!(
                    "Cursor {} is past the end of `{}`",
                    loc,
                    self.program.function(loc.func).name
                )
            })?;
            debug!("Executing {}: {}", loc, self.program.display(instr));

            let mut ctx = EvalContext::new(&self.program, &mut self.evaluator);
            self.hook.execute(instr, &mut ctx)?;
        }
        Ok(())
    }

    /// Discards every frame left behind by a faulted run.
    pub fn reset(&mut self) {
        let depth = self.evaluator.stack().depth();
        if depth > 0 {
            debug!("Discarding {} stale frames", depth);
        }
        self.evaluator.stack_mut().clear();
    }

    /// Runs the program's `main` with C-style arguments.
    ///
    /// `args` becomes `argc`/`argv` and `env` becomes `envp`, each passed only
    /// when `main` declares the matching parameter. Returns the exit status:
    /// an integer result truncated to 32 bits, or 0 for `void`.
    pub fn run_main(&mut self, args: &[String], env: &[String]) -> Result<i32> {
        let entry = self
            .program
            .get_function(ENTRY_FUNCTION)
            .ok_or_else(|| InterpError::MissingEntryPoint(ENTRY_FUNCTION.to_string()))?;
        info!("Found entry function: {}", ENTRY_FUNCTION);

        self.evaluator.set_errno(0);
        let main_args = main_arguments(self.program.function(entry), args, env)?;
        let result = self.run_function(entry, &main_args)?;
        self.evaluator.flush_output()?;

        let status = exit_status(&result)?;
        info!("Interpretation completed with exit status: {}", status);
        Ok(status)
    }
}

/// Marshals `argc`, `argv` and `envp` for the parameters `main` declares.
fn main_arguments(main: &Function, args: &[String], env: &[String]) -> Result<Vec<TypedValue>> {
    let signature_error = |reason: String| InterpError::MainSignature {
        name: main.name.clone(),
        reason,
    };
    if main.arity() > 3 {
        return Err(signature_error(format!(
            "expected at most 3 parameters, found {}",
            main.arity()
        ))
        .into());
    }

    let mut values = Vec::with_capacity(main.arity());
    for (index, ty) in main.params.iter().enumerate() {
        let value = match index {
            0 if ty.is_int() => TypedValue::from_int(*ty, args.len() as u128)?,
            0 => return Err(signature_error(format!("argc must be an integer, found {ty}")).into()),
            1 if *ty == Type::Ptr => TypedValue::from_strings(args),
            2 if *ty == Type::Ptr => TypedValue::from_strings(env),
            _ => {
                return Err(signature_error(format!(
                    "parameter {index} must be ptr, found {ty}"
                ))
                .into());
            }
        };
        values.push(value);
    }
    Ok(values)
}

/// Converts the value returned by `main` into a process exit status.
pub fn exit_status(value: &TypedValue) -> Result<i32> {
    match value.ty {
        Type::Void => Ok(0),
        Type::Int(_) => value
            .as_i128()
            .map(|status| status as i32)
            .ok_or_else(|| anyhow!("Malformed exit value: {}", value)),
        ty => Err(InterpError::ExitStatus(ty).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_program;

    fn interpreter(source: &str) -> ExtensibleInterpreter {
        let ctx = Context::new();
        let program = parse_program(&ctx, "test", source).unwrap();
        ExtensibleInterpreter::new(&ctx, program, Forward)
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_run_main_returns_status() {
        let mut interp = interpreter("define i32 @main() {\nentry:\n  ret i32 7\n}\n");
        assert_eq!(interp.run_main(&[], &[]).unwrap(), 7);
        assert!(interp.evaluator().stack().is_empty());
    }

    #[test]
    fn test_run_main_passes_argc() {
        let mut interp = interpreter("define i32 @main(i32 %0) {\nentry:\n  ret i32 %0\n}\n");
        let status = interp.run_main(&strings(&["prog", "a", "b"]), &[]).unwrap();
        assert_eq!(status, 3);
    }

    #[test]
    fn test_run_main_void_is_success() {
        let mut interp = interpreter("define void @main() {\nentry:\n  ret void\n}\n");
        assert_eq!(interp.run_main(&[], &[]).unwrap(), 0);
    }

    #[test]
    fn test_missing_main() {
        let mut interp = interpreter("define i32 @start() {\nentry:\n  ret i32 0\n}\n");
        let err = interp.run_main(&[], &[]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InterpError>(),
            Some(InterpError::MissingEntryPoint(name)) if name == "main"
        ));
        assert!(interp.evaluator().stack().is_empty());
    }

    #[test]
    fn test_main_signature_checks() {
        let mut interp = interpreter("define i32 @main(ptr %0) {\nentry:\n  ret i32 0\n}\n");
        let err = interp.run_main(&[], &[]).unwrap_err();
        assert!(err.to_string().contains("argc must be an integer"));

        let mut interp = interpreter(
            "define i32 @main(i32 %0, ptr %1, ptr %2, i32 %3) {\nentry:\n  ret i32 0\n}\n",
        );
        let err = interp.run_main(&[], &[]).unwrap_err();
        assert!(err.to_string().contains("at most 3 parameters"));
    }

    #[test]
    fn test_exit_status() {
        assert_eq!(exit_status(&TypedValue::void()).unwrap(), 0);
        assert_eq!(exit_status(&TypedValue::from_i32(-1)).unwrap(), -1);
        assert_eq!(exit_status(&TypedValue::from_bool(true)).unwrap(), -1);
        assert_eq!(exit_status(&TypedValue::from_i64(1 << 32 | 5)).unwrap(), 5);
        let err = exit_status(&TypedValue::from_f64(1.0)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InterpError>(),
            Some(InterpError::ExitStatus(Type::F64))
        ));
    }

    #[test]
    fn test_fault_leaves_stack_until_reset() {
        let mut interp = interpreter(
            "define i32 @main() {\nentry:\n  %0 = const i32 1\n  %1 = const i32 0\n  %2 = sdiv i32 %0, %1\n  ret i32 %2\n}\n",
        );
        let err = interp.run_main(&[], &[]).unwrap_err();
        assert!(err.to_string().contains("Division by zero"));
        assert_eq!(interp.evaluator().stack().depth(), 1);
        interp.reset();
        assert!(interp.evaluator().stack().is_empty());
    }

    #[test]
    fn test_stale_frames_do_not_leak_into_next_run() {
        let mut interp = interpreter(
            "define i32 @seven() {\nentry:\n  ret i32 7\n}\n\ndefine i32 @main() {\nentry:\n  %0 = sdiv i32 1, 0\n  ret i32 %0\n}\n",
        );
        assert!(interp.run_main(&[], &[]).is_err());
        assert_eq!(interp.evaluator().stack().depth(), 1);

        let result = interp.run_function_by_name("seven", &[]).unwrap();
        assert_eq!(result, TypedValue::from_i32(7));
        assert!(interp.evaluator().stack().is_empty());

        assert!(interp.run_main(&[], &[]).is_err());
        assert_eq!(interp.evaluator().stack().depth(), 1);
    }
}
