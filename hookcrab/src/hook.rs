//! The per-instruction extension point.
//!
//! The interpreter loop hands every fetched instruction to an
//! [`ExecutionHook`] together with an [`EvalContext`]. The default
//! [`ExecutionHook::execute`] simply forwards to the base evaluator. A hook that
//! must preserve semantics has to call [`EvalContext::evaluate`] exactly once
//! with the instruction it was given; anything else (skipping, replacing,
//! faulting) deliberately changes the program's behavior.

use crate::interpreter::BaseEvaluator;
use crate::program::{Instruction, Program};
use crate::stack::CallStack;
use crate::value::TypedValue;
use anyhow::Result;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;

/// What a hook can see and do while handling one instruction.
pub struct EvalContext<'a> {
    program: &'a Program,
    evaluator: &'a mut BaseEvaluator,
}

impl<'a> EvalContext<'a> {
    pub(crate) fn new(program: &'a Program, evaluator: &'a mut BaseEvaluator) -> Self {
        Self { program, evaluator }
    }

    /// Applies the standard semantics of `instr`.
    pub fn evaluate(&mut self, instr: &Instruction) -> Result<()> {
        self.evaluator.evaluate(self.program, instr)
    }

    pub fn program(&self) -> &Program {
        self.program
    }

    pub fn stack(&self) -> &CallStack {
        self.evaluator.stack()
    }

    /// Direct access to the frames. Changes made here bypass the evaluator.
    pub fn stack_mut(&mut self) -> &mut CallStack {
        self.evaluator.stack_mut()
    }

    pub fn exit_value(&self) -> Option<&TypedValue> {
        self.evaluator.exit_value()
    }

    pub fn errno(&self) -> i32 {
        self.evaluator.errno()
    }
}

pub trait ExecutionHook {
    /// Handles one instruction. Called exactly once per fetched instruction,
    /// after the frame's cursor has already moved past it.
    fn execute(&mut self, instr: &Instruction, ctx: &mut EvalContext<'_>) -> Result<()> {
        ctx.evaluate(instr)
    }
}

impl<H: ExecutionHook + ?Sized> ExecutionHook for &mut H {
    fn execute(&mut self, instr: &Instruction, ctx: &mut EvalContext<'_>) -> Result<()> {
        (**self).execute(instr, ctx)
    }
}

impl<H: ExecutionHook + ?Sized> ExecutionHook for Box<H> {
    fn execute(&mut self, instr: &Instruction, ctx: &mut EvalContext<'_>) -> Result<()> {
        (**self).execute(instr, ctx)
    }
}

/// Forwards every instruction to the base evaluator.
#[derive(Debug, Default, Clone, Copy)]
pub struct Forward;

impl ExecutionHook for Forward {}

/// Runs a callback before forwarding each instruction.
pub struct Observe<F>(pub F);

impl<F> ExecutionHook for Observe<F>
where
    F: FnMut(&Instruction, &EvalContext<'_>),
{
    fn execute(&mut self, instr: &Instruction, ctx: &mut EvalContext<'_>) -> Result<()> {
        (self.0)(instr, ctx);
        ctx.evaluate(instr)
    }
}

/// Hands each instruction to a callback instead of the evaluator.
///
/// The callback decides whether, and how, to delegate to
/// [`EvalContext::evaluate`].
pub struct Replace<F>(pub F);

impl<F> ExecutionHook for Replace<F>
where
    F: FnMut(&Instruction, &mut EvalContext<'_>) -> Result<()>,
{
    fn execute(&mut self, instr: &Instruction, ctx: &mut EvalContext<'_>) -> Result<()> {
        (self.0)(instr, ctx)
    }
}

/// Prints every executed instruction before running it.
#[derive(Debug)]
pub struct Tracer<W> {
    out: W,
}

impl<W: Write> Tracer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl Tracer<std::io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }
}

impl<W: Write> ExecutionHook for Tracer<W> {
    fn execute(&mut self, instr: &Instruction, ctx: &mut EvalContext<'_>) -> Result<()> {
        writeln!(self.out, "{}", ctx.program().display(instr))?;
        ctx.evaluate(instr)
    }
}

/// Counts executed instructions per opcode.
#[derive(Debug, Default, Clone)]
pub struct InstructionCounter {
    counts: BTreeMap<&'static str, u64>,
    total: u64,
}

impl InstructionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn count(&self, opcode: &str) -> u64 {
        self.counts.get(opcode).copied().unwrap_or_default()
    }

    pub fn counts(&self) -> &BTreeMap<&'static str, u64> {
        &self.counts
    }
}

impl ExecutionHook for InstructionCounter {
    fn execute(&mut self, instr: &Instruction, ctx: &mut EvalContext<'_>) -> Result<()> {
        *self.counts.entry(instr.kind.opcode()).or_default() += 1;
        self.total += 1;
        ctx.evaluate(instr)
    }
}

impl fmt::Display for InstructionCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (opcode, count) in &self.counts {
            writeln!(f, "{opcode:>12} {count}")?;
        }
        write!(f, "{:>12} {}", "total", self.total)
    }
}
