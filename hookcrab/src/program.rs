//! Immutable program representation.
//!
//! A [`Program`] owns its functions, each function owns its basic blocks and
//! each block owns its instructions. Nothing here changes once the loader hands
//! the program over; instructions record their own position so tools can refer
//! back to them.

use crate::ty::Type;
use std::collections::HashMap;
use std::fmt;

/// Index type for local variables in a function's stack frame.
pub type Local = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

/// Position of an instruction inside the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrLoc {
    pub func: FuncId,
    pub block: BlockId,
    pub index: usize,
}

impl fmt::Display for InstrLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn{}:bb{}:{}", self.func.0, self.block.0, self.index)
    }
}

/// Constant operand. Its type comes from the instruction that uses it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    Int(i128),
    Float(f64),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Float(x) => write!(f, "{x:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Local(Local),
    Const(Literal),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Local(local) => write!(f, "%{local}"),
            Operand::Const(lit) => write!(f, "{lit}"),
        }
    }
}

macro_rules! keyword_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn keyword(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn from_keyword(text: &str) -> Option<Self> {
                match text {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.keyword())
            }
        }
    };
}

keyword_enum!(
    /// Binary arithmetic and bitwise operations.
    BinOp {
        Add => "add",
        Sub => "sub",
        Mul => "mul",
        SDiv => "sdiv",
        UDiv => "udiv",
        SRem => "srem",
        URem => "urem",
        And => "and",
        Or => "or",
        Xor => "xor",
        Shl => "shl",
        LShr => "lshr",
        AShr => "ashr",
        FAdd => "fadd",
        FSub => "fsub",
        FMul => "fmul",
        FDiv => "fdiv",
    }
);

impl BinOp {
    pub fn is_float(&self) -> bool {
        matches!(self, BinOp::FAdd | BinOp::FSub | BinOp::FMul | BinOp::FDiv)
    }
}

keyword_enum!(
    IntPredicate {
        Eq => "eq",
        Ne => "ne",
        Slt => "slt",
        Sle => "sle",
        Sgt => "sgt",
        Sge => "sge",
        Ult => "ult",
        Ule => "ule",
        Ugt => "ugt",
        Uge => "uge",
    }
);

keyword_enum!(
    /// Ordered float comparisons; any NaN operand makes them false.
    FloatPredicate {
        Oeq => "oeq",
        One => "one",
        Olt => "olt",
        Ole => "ole",
        Ogt => "ogt",
        Oge => "oge",
    }
);

#[derive(Debug, Clone, PartialEq)]
pub enum InstKind {
    Const {
        ty: Type,
        value: Literal,
    },
    Binary {
        op: BinOp,
        ty: Type,
        lhs: Operand,
        rhs: Operand,
    },
    ICmp {
        pred: IntPredicate,
        ty: Type,
        lhs: Operand,
        rhs: Operand,
    },
    FCmp {
        pred: FloatPredicate,
        ty: Type,
        lhs: Operand,
        rhs: Operand,
    },
    Copy {
        ty: Type,
        src: Operand,
    },
    Call {
        ty: Type,
        callee: FuncId,
        args: Vec<Operand>,
    },
    Br {
        target: BlockId,
    },
    CondBr {
        cond: Operand,
        then_block: BlockId,
        else_block: BlockId,
    },
    Ret {
        ty: Type,
        value: Option<Operand>,
    },
    Nop,
    Unreachable,
}

impl InstKind {
    /// Mnemonic of the instruction, used for reporting.
    pub fn opcode(&self) -> &'static str {
        match self {
            InstKind::Const { .. } => "const",
            InstKind::Binary { op, .. } => op.keyword(),
            InstKind::ICmp { .. } => "icmp",
            InstKind::FCmp { .. } => "fcmp",
            InstKind::Copy { .. } => "copy",
            InstKind::Call { .. } => "call",
            InstKind::Br { .. } => "br",
            InstKind::CondBr { .. } => "condbr",
            InstKind::Ret { .. } => "ret",
            InstKind::Nop => "nop",
            InstKind::Unreachable => "unreachable",
        }
    }

    /// Whether the instruction ends a basic block.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Br { .. } | InstKind::CondBr { .. } | InstKind::Ret { .. } | InstKind::Unreachable
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub loc: InstrLoc,
    /// Local written by the instruction, if any.
    pub dest: Option<Local>,
    pub kind: InstKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub name: String,
    pub instructions: Vec<Instruction>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub ret: Type,
    pub params: Vec<Type>,
    /// Empty for declarations, which are resolved against builtins.
    pub blocks: Vec<BasicBlock>,
    /// Number of local slots a frame for this function needs.
    pub num_locals: usize,
}

impl Function {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn entry_block(&self) -> BlockId {
        BlockId(0)
    }

    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.0)
    }
}

#[derive(Debug)]
pub struct Program {
    name: String,
    functions: Vec<Function>,
    by_name: HashMap<String, FuncId>,
}

impl Program {
    /// Builds a program from already validated functions.
    pub(crate) fn new(name: String, functions: Vec<Function>) -> Self {
        let by_name = functions
            .iter()
            .enumerate()
            .map(|(idx, func)| (func.name.clone(), FuncId(idx)))
            .collect();
        Self {
            name,
            functions,
            by_name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.0]
    }

    pub fn get_function(&self, name: &str) -> Option<FuncId> {
        self.by_name.get(name).copied()
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(idx, func)| (FuncId(idx), func))
    }

    pub fn instruction(&self, loc: InstrLoc) -> Option<&Instruction> {
        self.functions
            .get(loc.func.0)?
            .blocks
            .get(loc.block.0)?
            .instructions
            .get(loc.index)
    }

    /// Renders an instruction in the textual syntax, resolving labels and callees.
    pub fn display<'a>(&'a self, instr: &'a Instruction) -> InstrDisplay<'a> {
        InstrDisplay {
            program: self,
            instr,
        }
    }
}

pub struct InstrDisplay<'a> {
    program: &'a Program,
    instr: &'a Instruction,
}

impl InstrDisplay<'_> {
    fn label(&self, block: BlockId) -> &str {
        self.program
            .functions
            .get(self.instr.loc.func.0)
            .and_then(|func| func.block(block))
            .map_or("<invalid>", |b| b.name.as_str())
    }
}

impl fmt::Display for InstrDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(dest) = self.instr.dest {
            write!(f, "%{dest} = ")?;
        }
        match &self.instr.kind {
            InstKind::Const { ty, value } => write!(f, "const {ty} {value}"),
            InstKind::Binary { op, ty, lhs, rhs } => write!(f, "{op} {ty} {lhs}, {rhs}"),
            InstKind::ICmp { pred, ty, lhs, rhs } => write!(f, "icmp {pred} {ty} {lhs}, {rhs}"),
            InstKind::FCmp { pred, ty, lhs, rhs } => write!(f, "fcmp {pred} {ty} {lhs}, {rhs}"),
            InstKind::Copy { ty, src } => write!(f, "copy {ty} {src}"),
            InstKind::Call { ty, callee, args } => {
                let name = self
                    .program
                    .functions
                    .get(callee.0)
                    .map_or("<invalid>", |func| func.name.as_str());
                write!(f, "call {ty} @{name}(")?;
                for (idx, arg) in args.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            InstKind::Br { target } => write!(f, "br {}", self.label(*target)),
            InstKind::CondBr {
                cond,
                then_block,
                else_block,
            } => write!(
                f,
                "condbr {cond}, {}, {}",
                self.label(*then_block),
                self.label(*else_block)
            ),
            InstKind::Ret { ty, value: Some(value) } => write!(f, "ret {ty} {value}"),
            InstKind::Ret { ty, value: None } => write!(f, "ret {ty}"),
            InstKind::Nop => write!(f, "nop"),
            InstKind::Unreachable => write!(f, "unreachable"),
        }
    }
}
