//! The base evaluator: the full semantics of every instruction.
//!
//! The evaluator owns the call stack, the exit value of the last top-level
//! invocation and the ambient error state. It never owns the program; each
//! call to [`BaseEvaluator::evaluate`] borrows it from the interpreter.

use super::builtins;
use super::place::evaluate_literal;
use super::rvalue::{BinaryEval, CompareEval};
use crate::context::Context;
use crate::program::{FuncId, InstKind, Instruction, Operand, Program};
use crate::stack::{CallStack, Frame};
use crate::ty::Type;
use crate::value::TypedValue;
use anyhow::{Result, anyhow, bail};
use std::fmt;
use std::io::Write;
use tracing::debug;

pub struct BaseEvaluator {
    stack: CallStack,
    exit_value: Option<TypedValue>,
    errno: i32,
    max_stack_depth: usize,
    output: Box<dyn Write>,
}

impl fmt::Debug for BaseEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseEvaluator")
            .field("stack", &self.stack)
            .field("exit_value", &self.exit_value)
            .field("errno", &self.errno)
            .field("max_stack_depth", &self.max_stack_depth)
            .finish_non_exhaustive()
    }
}

impl BaseEvaluator {
    /// Creates an evaluator that writes program output to stdout.
    pub fn new(ctx: &Context) -> Self {
        Self::with_output(ctx, Box::new(std::io::stdout()))
    }

    pub fn with_output(ctx: &Context, output: Box<dyn Write>) -> Self {
        Self {
            stack: CallStack::new(),
            exit_value: None,
            errno: 0,
            max_stack_depth: ctx.max_stack_depth(),
            output,
        }
    }

    pub fn stack(&self) -> &CallStack {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut CallStack {
        &mut self.stack
    }

    /// Value returned by the outermost frame of the last invocation.
    pub fn exit_value(&self) -> Option<&TypedValue> {
        self.exit_value.as_ref()
    }

    pub(crate) fn clear_exit_value(&mut self) {
        self.exit_value = None;
    }

    pub fn errno(&self) -> i32 {
        self.errno
    }

    pub fn set_errno(&mut self, errno: i32) {
        self.errno = errno;
    }

    pub(crate) fn output(&mut self) -> &mut dyn Write {
        self.output.as_mut()
    }

    pub fn flush_output(&mut self) -> Result<()> {
        self.output.flush()?;
        Ok(())
    }

    /// Pushes a new activation, enforcing the configured depth limit.
    pub fn push_frame(&mut self, frame: Frame) -> Result<()> {
        if self.stack.depth() >= self.max_stack_depth {
            bail!(
                "Stack overflow: call depth exceeds {}",
                self.max_stack_depth
            );
        }
        self.stack.push(frame);
        Ok(())
    }

    /// Drops every frame and records `value` as the exit value.
    pub(crate) fn unwind(&mut self, value: TypedValue) {
        debug!("Unwinding {} frames", self.stack.depth());
        self.stack.clear();
        self.exit_value = Some(value);
    }

    /// Performs the effect of `instr` on the top frame.
    pub fn evaluate(&mut self, program: &Program, instr: &Instruction) -> Result<()> {
        match &instr.kind {
            InstKind::Const { ty, value } => {
                let value = evaluate_literal(*value, *ty)?;
                self.assign_result(instr, value)
            }
            InstKind::Binary { op, ty, lhs, rhs } => {
                let lhs = self.evaluate_operand(lhs, *ty)?;
                let rhs = self.evaluate_operand(rhs, *ty)?;
                let value = op.eval(&lhs, &rhs)?;
                self.assign_result(instr, value)
            }
            InstKind::ICmp { pred, ty, lhs, rhs } => {
                let lhs = self.evaluate_operand(lhs, *ty)?;
                let rhs = self.evaluate_operand(rhs, *ty)?;
                let value = pred.eval(&lhs, &rhs)?;
                self.assign_result(instr, value)
            }
            InstKind::FCmp { pred, ty, lhs, rhs } => {
                let lhs = self.evaluate_operand(lhs, *ty)?;
                let rhs = self.evaluate_operand(rhs, *ty)?;
                let value = pred.eval(&lhs, &rhs)?;
                self.assign_result(instr, value)
            }
            InstKind::Copy { ty, src } => {
                let value = self.copy_operand(src, *ty)?;
                self.assign_result(instr, value)
            }
            InstKind::Call { ty, callee, args } => self.call(program, instr, *ty, *callee, args),
            InstKind::Br { target } => {
                self.top_frame_mut()?.jump(*target);
                Ok(())
            }
            InstKind::CondBr {
                cond,
                then_block,
                else_block,
            } => {
                let cond = self.evaluate_operand(cond, Type::I1)?;
                let taken = cond
                    .as_bool()
                    .ok_or_else(|| anyhow!("Cannot branch on non-boolean value: {}", cond))?;
                let target = if taken { *then_block } else { *else_block };
                self.top_frame_mut()?.jump(target);
                Ok(())
            }
            InstKind::Ret { ty, value } => {
                let value = match value {
                    Some(operand) => self.evaluate_operand(operand, *ty)?,
                    None => TypedValue::void(),
                };
                self.return_from_frame(value)
            }
            InstKind::Nop => Ok(()),
            InstKind::Unreachable => bail!("Reached unreachable instruction at {}", instr.loc),
        }
    }

    fn call(
        &mut self,
        program: &Program,
        instr: &Instruction,
        ty: Type,
        callee: FuncId,
        args: &[Operand],
    ) -> Result<()> {
        let function = program.function(callee);
        let mut values = Vec::with_capacity(args.len());
        for (arg, param_ty) in args.iter().zip(&function.params) {
            values.push(self.evaluate_operand(arg, *param_ty)?);
        }

        if function.is_declaration() {
            debug!("Calling external function `{}`", function.name);
            if let Some(value) = builtins::call(self, &function.name, &values)? {
                if value.ty != ty {
                    bail!(
                        "External function `{}` returned {}, but is declared to return {}",
                        function.name,
                        value.ty,
                        ty
                    );
                }
                self.assign_result(instr, value)?;
            }
            return Ok(());
        }

        debug!(
            "Entering function `{}` at depth {}",
            function.name,
            self.stack.depth() + 1
        );
        self.push_frame(Frame::new(callee, function, values, instr.dest))
    }

    fn return_from_frame(&mut self, value: TypedValue) -> Result<()> {
        let frame = self
            .stack
            .pop()
            .ok_or_else(|| anyhow!("Return without an active frame"))?;
        debug!("Returning {} from {:?}", value, frame.function());
        match self.stack.top_mut() {
            Some(caller) => match frame.ret_local() {
                Some(local) => caller.write_local(local, value),
                None => Ok(()),
            },
            None => {
                self.exit_value = Some(value);
                Ok(())
            }
        }
    }

    fn top_frame_mut(&mut self) -> Result<&mut Frame> {
        self.stack
            .top_mut()
            .ok_or_else(|| anyhow!("No active frame"))
    }
}
