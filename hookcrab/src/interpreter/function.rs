//! Invoking functions from outside the program.
use super::ExtensibleInterpreter;
use crate::error::InterpError;
use crate::hook::ExecutionHook;
use crate::program::{FuncId, Function};
use crate::stack::Frame;
use crate::value::TypedValue;
use anyhow::Result;
use tracing::{debug, info, warn};

impl<H: ExecutionHook> ExtensibleInterpreter<H> {
    /// Pushes a frame for `func` with its parameters bound to `args`.
    ///
    /// Nothing is executed; see [`Self::run`]. Arguments beyond the
    /// function's arity are ignored.
    pub fn call_function(&mut self, func: FuncId, args: &[TypedValue]) -> Result<()> {
        let function = self.program.function(func);
        let bound = bind_arguments(function, args)?;
        debug!(
            "Calling `{}` with {} arguments at depth {}",
            function.name,
            bound.len(),
            self.evaluator.stack().depth() + 1
        );
        self.evaluator
            .push_frame(Frame::new(func, function, bound, None))
    }

    /// Calls `func` and runs until the call stack drains.
    ///
    /// Frames left behind by an earlier faulted run are discarded first, so
    /// only the new activation executes. Returns the value produced by the
    /// outermost return, or `void` when the function finished without
    /// producing one.
    pub fn run_function(&mut self, func: FuncId, args: &[TypedValue]) -> Result<TypedValue> {
        self.reset();
        self.evaluator.clear_exit_value();
        self.call_function(func, args)?;
        self.run()?;
        match self.evaluator.exit_value() {
            Some(value) => Ok(value.clone()),
            None => {
                warn!(
                    "`{}` finished without an exit value",
                    self.program.function(func).name
                );
                Ok(TypedValue::void())
            }
        }
    }

    /// Looks up `name` and runs it with `args`.
    pub fn run_function_by_name(&mut self, name: &str, args: &[TypedValue]) -> Result<TypedValue> {
        let func = self
            .program
            .get_function(name)
            .ok_or_else(|| InterpError::FunctionNotFound(name.to_string()))?;
        info!("Found function: {}", name);

        let result = self.run_function(func, args)?;
        info!("Function '{}' returned: {}", name, result);
        Ok(result)
    }
}

/// Checks `args` against the parameters of `function` and retags each one with
/// its parameter's type.
fn bind_arguments(function: &Function, args: &[TypedValue]) -> Result<Vec<TypedValue>, InterpError> {
    if function.is_declaration() {
        return Err(InterpError::NoBody {
            name: function.name.clone(),
        });
    }
    if args.len() < function.arity() {
        return Err(InterpError::ArityMismatch {
            name: function.name.clone(),
            expected: function.arity(),
            found: args.len(),
        });
    }
    if args.len() > function.arity() {
        debug!(
            "Ignoring {} extra arguments passed to `{}`",
            args.len() - function.arity(),
            function.name
        );
    }

    args.iter()
        .zip(&function.params)
        .enumerate()
        .map(|(index, (arg, ty))| {
            arg.clone()
                .retag(*ty)
                .map_err(|_| InterpError::TypeMismatch {
                    name: function.name.clone(),
                    index,
                    expected: *ty,
                    found: arg.ty,
                })
        })
        .collect()
}
