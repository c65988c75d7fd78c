//! Execution frames and the call stack.
//!
//! A frame is one in-progress activation of a function: which instruction runs
//! next, the values of its locals, and where the caller wants the result.
//! The cursor only ever points at an instruction of the frame's own function;
//! a frame whose function has returned is popped right away.

use crate::program::{BlockId, FuncId, Function, InstrLoc, Local};
use crate::value::TypedValue;
use anyhow::{Result, anyhow, bail};

/// Next instruction to run inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub block: BlockId,
    pub index: usize,
}

/// Activation record for one function call.
///
/// Each slot can either contain a value (Some) or be uninitialized (None).
/// Parameters occupy the first slots, in declaration order.
#[derive(Debug, Clone)]
pub struct Frame {
    function: FuncId,
    cursor: Cursor,
    locals: Vec<Option<TypedValue>>,
    ret_local: Option<Local>,
}

impl Frame {
    /// Creates a frame positioned at the entry of `function`.
    ///
    /// `args` must already match the function's parameters; binding policy is
    /// up to the caller.
    pub fn new(
        id: FuncId,
        function: &Function,
        args: Vec<TypedValue>,
        ret_local: Option<Local>,
    ) -> Self {
        let mut locals = vec![None; function.num_locals.max(args.len())];
        for (slot, arg) in locals.iter_mut().zip(args) {
            *slot = Some(arg);
        }
        Self {
            function: id,
            cursor: Cursor {
                block: function.entry_block(),
                index: 0,
            },
            locals,
            ret_local,
        }
    }

    pub fn function(&self) -> FuncId {
        self.function
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Local in the caller's frame that receives this frame's return value.
    pub fn ret_local(&self) -> Option<Local> {
        self.ret_local
    }

    /// Location of the instruction under the cursor.
    pub fn current(&self) -> InstrLoc {
        InstrLoc {
            func: self.function,
            block: self.cursor.block,
            index: self.cursor.index,
        }
    }

    /// Returns the current location and moves the cursor to the next instruction.
    pub fn advance(&mut self) -> InstrLoc {
        let loc = self.current();
        self.cursor.index += 1;
        loc
    }

    /// Moves the cursor to the first instruction of `block`.
    pub fn jump(&mut self, block: BlockId) {
        self.cursor = Cursor { block, index: 0 };
    }

    pub fn locals(&self) -> &[Option<TypedValue>] {
        &self.locals
    }

    pub fn read_local(&self, local: Local) -> Result<&TypedValue> {
        if local >= self.locals.len() {
            bail!("Local index {} out of bounds", local);
        }
        self.locals[local]
            .as_ref()
            .ok_or_else(|| anyhow!("Uninitialized local: {}", local))
    }

    pub fn write_local(&mut self, local: Local, value: TypedValue) -> Result<()> {
        if local >= self.locals.len() {
            bail!("Local index {} out of bounds", local);
        }
        self.locals[local] = Some(value);
        Ok(())
    }
}

/// Last-in-first-out sequence of frames. The top is the running activation.
#[derive(Debug, Default, Clone)]
pub struct CallStack {
    frames: Vec<Frame>,
}

impl CallStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Frames from the outermost to the innermost.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Drops every frame, unwinding the whole stack.
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
