//! Loading of textual programs.
//!
//! Loading happens in two steps. [`Module::parse`] splits the source into
//! function headers, labels and raw instruction lines. [`Module::materialize`]
//! then consumes the module, parses every instruction, resolves labels and
//! callees, and validates block structure. Only a fully materialized
//! [`Program`] can be executed, so every load error surfaces before a frame
//! exists.

use crate::context::Context;
use crate::error::LoadError;
use crate::program::{
    BasicBlock, BinOp, BlockId, FloatPredicate, FuncId, Function, InstKind, InstrLoc, Instruction,
    IntPredicate, Literal, Local, Operand, Program,
};
use crate::ty::Type;
use std::collections::HashMap;
use std::io::Read;
use tracing::{debug, info};

/// Reads and materializes a program from `path`, or from standard input if
/// `path` is `-`.
pub fn load_file(ctx: &Context, path: &str) -> Result<Program, LoadError> {
    if path == "-" {
        return load_reader(ctx, "<stdin>", std::io::stdin().lock());
    }
    let source = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_string(),
        source,
    })?;
    parse_program(ctx, path, &source)
}

pub fn load_reader<R: Read>(ctx: &Context, name: &str, mut reader: R) -> Result<Program, LoadError> {
    let mut source = String::new();
    reader
        .read_to_string(&mut source)
        .map_err(|source| LoadError::Io {
            path: name.to_string(),
            source,
        })?;
    parse_program(ctx, name, &source)
}

/// Parses and eagerly materializes `source`.
pub fn parse_program(ctx: &Context, name: &str, source: &str) -> Result<Program, LoadError> {
    let module = Module::parse(source)?;
    debug!("Parsed {} function headers from `{}`", module.functions.len(), name);
    let program = module.materialize(ctx, name)?;
    info!(
        "Loaded program `{}` with {} functions",
        program.name(),
        program.functions().count()
    );
    Ok(program)
}

/// A parsed but not yet materialized program.
#[derive(Debug, Default)]
pub struct Module {
    functions: Vec<RawFunction>,
}

#[derive(Debug)]
struct RawFunction {
    name: String,
    ret: Type,
    params: Vec<Type>,
    line: usize,
    is_definition: bool,
    blocks: Vec<RawBlock>,
}

#[derive(Debug)]
struct RawBlock {
    name: String,
    line: usize,
    lines: Vec<(usize, String)>,
}

impl Module {
    pub fn parse(source: &str) -> Result<Self, LoadError> {
        let mut module = Module::default();
        let mut current: Option<RawFunction> = None;

        for (idx, raw_line) in source.lines().enumerate() {
            let line_no = idx + 1;
            let line = strip_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }

            if line == "}" {
                let Some(func) = current.take() else {
                    return Err(LoadError::parse(line_no, "unmatched `}`"));
                };
                if func.blocks.is_empty() {
                    return Err(LoadError::parse(
                        func.line,
                        format!("function `@{}` has no blocks", func.name),
                    ));
                }
                module.functions.push(func);
                continue;
            }

            if let Some(func) = current.as_mut() {
                func.add_line(line_no, line)?;
                continue;
            }

            let tokens = tokenize(line);
            match tokens.first().copied() {
                Some("define") => current = Some(parse_header(tokens, line_no, true)?),
                Some("declare") => module.functions.push(parse_header(tokens, line_no, false)?),
                _ => {
                    return Err(LoadError::parse(
                        line_no,
                        format!("expected `define` or `declare`, found `{line}`"),
                    ));
                }
            }
        }

        if let Some(func) = current {
            return Err(LoadError::parse(
                func.line,
                format!("function `@{}` is missing its closing `}}`", func.name),
            ));
        }
        Ok(module)
    }

    /// Resolves every function body, consuming the module.
    pub fn materialize(self, ctx: &Context, name: &str) -> Result<Program, LoadError> {
        let mut names = HashMap::new();
        for (idx, func) in self.functions.iter().enumerate() {
            if names.insert(func.name.clone(), FuncId(idx)).is_some() {
                return Err(LoadError::materialize(
                    func.line,
                    format!("duplicate function `@{}`", func.name),
                ));
            }
        }

        let mut functions = Vec::with_capacity(self.functions.len());
        for (idx, raw) in self.functions.iter().enumerate() {
            functions.push(materialize_function(
                ctx,
                &self.functions,
                &names,
                FuncId(idx),
                raw,
            )?);
        }
        Ok(Program::new(name.to_string(), functions))
    }
}

impl RawFunction {
    fn add_line(&mut self, line_no: usize, line: &str) -> Result<(), LoadError> {
        if let Some(label) = line.strip_suffix(':') {
            if !is_ident(label) {
                return Err(LoadError::parse(line_no, format!("invalid label `{label}`")));
            }
            self.blocks.push(RawBlock {
                name: label.to_string(),
                line: line_no,
                lines: Vec::new(),
            });
            return Ok(());
        }
        match self.blocks.last_mut() {
            Some(block) => {
                block.lines.push((line_no, line.to_string()));
                Ok(())
            }
            None => Err(LoadError::parse(
                line_no,
                "instruction outside of a basic block",
            )),
        }
    }
}

fn parse_header(tokens: Vec<&str>, line: usize, is_definition: bool) -> Result<RawFunction, LoadError> {
    let mut toks = Tokens::new(tokens, line);
    toks.next()?;
    let ret = toks.ty()?;
    let name = toks.global()?.to_string();
    toks.expect("(")?;

    let mut params = Vec::new();
    if !toks.eat(")") {
        loop {
            let ty = toks.ty()?;
            if ty.is_void() {
                return Err(toks.error("parameters cannot have type void"));
            }
            if is_definition || toks.peek().is_some_and(|t| t.starts_with('%')) {
                let local = toks.local()?;
                if local != params.len() {
                    return Err(toks.error(format!(
                        "parameter %{} must be named %{}",
                        local,
                        params.len()
                    )));
                }
            }
            params.push(ty);
            if toks.eat(")") {
                break;
            }
        }
    }
    if is_definition {
        toks.expect("{")?;
    }
    toks.finish()?;

    Ok(RawFunction {
        name,
        ret,
        params,
        line,
        is_definition,
        blocks: Vec::new(),
    })
}

fn materialize_function(
    ctx: &Context,
    raw_functions: &[RawFunction],
    names: &HashMap<String, FuncId>,
    id: FuncId,
    raw: &RawFunction,
) -> Result<Function, LoadError> {
    let mut labels = HashMap::new();
    for (idx, block) in raw.blocks.iter().enumerate() {
        if labels.insert(block.name.as_str(), BlockId(idx)).is_some() {
            return Err(LoadError::materialize(
                block.line,
                format!("duplicate label `{}` in `@{}`", block.name, raw.name),
            ));
        }
    }

    let mut parser = InstrParser {
        raw_functions,
        names,
        labels: &labels,
        current: raw,
        max_locals: ctx.max_locals(),
        max_local: None,
    };

    let mut blocks = Vec::with_capacity(raw.blocks.len());
    for (block_idx, raw_block) in raw.blocks.iter().enumerate() {
        if raw_block.lines.is_empty() {
            return Err(LoadError::materialize(
                raw_block.line,
                format!("block `{}` is empty", raw_block.name),
            ));
        }
        let mut instructions = Vec::with_capacity(raw_block.lines.len());
        for (index, (line, text)) in raw_block.lines.iter().enumerate() {
            let loc = InstrLoc {
                func: id,
                block: BlockId(block_idx),
                index,
            };
            let instr = parser.parse(*line, text, loc)?;
            let is_last = index + 1 == raw_block.lines.len();
            if is_last && !instr.kind.is_terminator() {
                return Err(LoadError::materialize(
                    *line,
                    format!("block `{}` does not end with a terminator", raw_block.name),
                ));
            }
            if !is_last && instr.kind.is_terminator() {
                return Err(LoadError::materialize(
                    *line,
                    format!(
                        "terminator `{}` in the middle of block `{}`",
                        instr.kind.opcode(),
                        raw_block.name
                    ),
                ));
            }
            instructions.push(instr);
        }
        blocks.push(BasicBlock {
            name: raw_block.name.clone(),
            instructions,
        });
    }

    let num_locals = parser
        .max_local
        .map_or(Some(0), |max| max.checked_add(1))
        .ok_or_else(|| {
            LoadError::materialize(raw.line, format!("`@{}` has too many locals", raw.name))
        })?
        .max(raw.params.len());
    if num_locals > ctx.max_locals() {
        return Err(LoadError::materialize(
            raw.line,
            format!(
                "`@{}` uses {} locals, more than the limit of {}",
                raw.name,
                num_locals,
                ctx.max_locals()
            ),
        ));
    }
    debug_assert!(raw.is_definition || blocks.is_empty());

    Ok(Function {
        name: raw.name.clone(),
        ret: raw.ret,
        params: raw.params.clone(),
        blocks,
        num_locals,
    })
}

/// Parses instruction lines of one function.
struct InstrParser<'a> {
    raw_functions: &'a [RawFunction],
    names: &'a HashMap<String, FuncId>,
    labels: &'a HashMap<&'a str, BlockId>,
    current: &'a RawFunction,
    max_locals: usize,
    max_local: Option<Local>,
}

impl InstrParser<'_> {
    fn parse(&mut self, line: usize, text: &str, loc: InstrLoc) -> Result<Instruction, LoadError> {
        let mut toks = Tokens::new(tokenize(text), line);
        let dest = if toks.peek().is_some_and(|t| t.starts_with('%')) {
            let dest = self.local(&mut toks)?;
            toks.expect("=")?;
            Some(dest)
        } else {
            None
        };

        let opcode = toks.next()?;
        let kind = match opcode {
            "const" => {
                let ty = toks.ty()?;
                let token = toks.next()?;
                let value = parse_literal(token)
                    .ok_or_else(|| toks.error(format!("invalid literal `{token}`")))?;
                check_literal(&toks, ty, value)?;
                InstKind::Const { ty, value }
            }
            "icmp" => {
                let pred = toks.next()?;
                let pred = IntPredicate::from_keyword(pred)
                    .ok_or_else(|| toks.error(format!("unknown integer predicate `{pred}`")))?;
                let ty = toks.ty()?;
                if !ty.is_int() {
                    return Err(toks.error(format!("icmp expects an integer type, found {ty}")));
                }
                let lhs = self.operand(&mut toks, ty)?;
                let rhs = self.operand(&mut toks, ty)?;
                InstKind::ICmp { pred, ty, lhs, rhs }
            }
            "fcmp" => {
                let pred = toks.next()?;
                let pred = FloatPredicate::from_keyword(pred)
                    .ok_or_else(|| toks.error(format!("unknown float predicate `{pred}`")))?;
                let ty = toks.ty()?;
                if !ty.is_float() {
                    return Err(toks.error(format!("fcmp expects a float type, found {ty}")));
                }
                let lhs = self.operand(&mut toks, ty)?;
                let rhs = self.operand(&mut toks, ty)?;
                InstKind::FCmp { pred, ty, lhs, rhs }
            }
            "copy" => {
                let ty = toks.ty()?;
                if ty.is_void() {
                    return Err(toks.error("cannot copy a void value"));
                }
                let src = self.operand(&mut toks, ty)?;
                InstKind::Copy { ty, src }
            }
            "call" => self.call(&mut toks)?,
            "br" => InstKind::Br {
                target: self.label(&mut toks)?,
            },
            "condbr" => {
                let cond = self.operand(&mut toks, Type::I1)?;
                let then_block = self.label(&mut toks)?;
                let else_block = self.label(&mut toks)?;
                InstKind::CondBr {
                    cond,
                    then_block,
                    else_block,
                }
            }
            "ret" => {
                let ty = toks.ty()?;
                if ty != self.current.ret {
                    return Err(LoadError::materialize(
                        line,
                        format!(
                            "`@{}` returns {}, but `ret` has type {}",
                            self.current.name, self.current.ret, ty
                        ),
                    ));
                }
                let value = if ty.is_void() {
                    None
                } else {
                    Some(self.operand(&mut toks, ty)?)
                };
                InstKind::Ret { ty, value }
            }
            "nop" => InstKind::Nop,
            "unreachable" => InstKind::Unreachable,
            other => {
                let op = BinOp::from_keyword(other)
                    .ok_or_else(|| toks.error(format!("unknown opcode `{other}`")))?;
                let ty = toks.ty()?;
                if op.is_float() && !ty.is_float() || !op.is_float() && !ty.is_int() {
                    return Err(toks.error(format!("`{op}` cannot operate on {ty}")));
                }
                let lhs = self.operand(&mut toks, ty)?;
                let rhs = self.operand(&mut toks, ty)?;
                InstKind::Binary { op, ty, lhs, rhs }
            }
        };
        toks.finish()?;

        let produces_value = match &kind {
            InstKind::Const { .. }
            | InstKind::Binary { .. }
            | InstKind::ICmp { .. }
            | InstKind::FCmp { .. }
            | InstKind::Copy { .. } => Some(true),
            InstKind::Call { ty, .. } => (!ty.is_void()).then_some(false),
            _ => None,
        };
        match (produces_value, dest) {
            (Some(true), None) => {
                return Err(toks.error(format!("result of `{opcode}` must be assigned")));
            }
            (None, Some(_)) => {
                return Err(toks.error(format!("`{opcode}` does not produce a value")));
            }
            _ => {}
        }

        Ok(Instruction { loc, dest, kind })
    }

    fn call(&mut self, toks: &mut Tokens<'_>) -> Result<InstKind, LoadError> {
        let ty = toks.ty()?;
        let name = toks.global()?;
        let callee = *self.names.get(name).ok_or_else(|| {
            LoadError::materialize(toks.line, format!("call to unknown function `@{name}`"))
        })?;
        let target = &self.raw_functions[callee.0];
        if target.ret != ty {
            return Err(LoadError::materialize(
                toks.line,
                format!("`@{}` returns {}, but is called as {}", name, target.ret, ty),
            ));
        }

        toks.expect("(")?;
        let mut args = Vec::new();
        while !toks.eat(")") {
            let Some(param_ty) = target.params.get(args.len()) else {
                return Err(LoadError::materialize(
                    toks.line,
                    format!("too many arguments for `@{}`", name),
                ));
            };
            args.push(self.operand(toks, *param_ty)?);
        }
        if args.len() != target.params.len() {
            return Err(LoadError::materialize(
                toks.line,
                format!(
                    "`@{}` expects {} arguments, found {}",
                    name,
                    target.params.len(),
                    args.len()
                ),
            ));
        }
        Ok(InstKind::Call { ty, callee, args })
    }

    fn label(&self, toks: &mut Tokens<'_>) -> Result<BlockId, LoadError> {
        let name = toks.next()?;
        self.labels
            .get(name)
            .copied()
            .ok_or_else(|| LoadError::materialize(toks.line, format!("unknown label `{name}`")))
    }

    fn local(&mut self, toks: &mut Tokens<'_>) -> Result<Local, LoadError> {
        let local = toks.local()?;
        if local >= self.max_locals {
            return Err(LoadError::materialize(
                toks.line,
                format!(
                    "`%{}` needs more than the limit of {} locals",
                    local, self.max_locals
                ),
            ));
        }
        self.max_local = self.max_local.max(Some(local));
        Ok(local)
    }

    fn operand(&mut self, toks: &mut Tokens<'_>, ty: Type) -> Result<Operand, LoadError> {
        if toks.peek().is_some_and(|t| t.starts_with('%')) {
            return Ok(Operand::Local(self.local(toks)?));
        }
        let token = toks.next()?;
        let lit = parse_literal(token)
            .ok_or_else(|| toks.error(format!("invalid operand `{token}`")))?;
        check_literal(toks, ty, lit)?;
        Ok(Operand::Const(lit))
    }
}

fn check_literal(toks: &Tokens<'_>, ty: Type, lit: Literal) -> Result<(), LoadError> {
    match (ty, lit) {
        (Type::Int(_), Literal::Int(_)) | (Type::F32 | Type::F64, _) => Ok(()),
        _ => Err(toks.error(format!("literal `{lit}` cannot have type {ty}"))),
    }
}

fn parse_literal(token: &str) -> Option<Literal> {
    match token {
        "true" => return Some(Literal::Int(1)),
        "false" => return Some(Literal::Int(0)),
        _ => {}
    }
    token
        .parse::<i128>()
        .ok()
        .or_else(|| token.parse::<u128>().ok().map(|u| u as i128))
        .map(Literal::Int)
        .or_else(|| token.parse::<f64>().ok().map(Literal::Float))
}

fn strip_comment(line: &str) -> &str {
    line.split_once(';').map_or(line, |(code, _)| code)
}

fn is_ident(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Splits a line on whitespace and commas. Brackets and `=` are tokens of their own.
fn tokenize(line: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = None;
    for (idx, ch) in line.char_indices() {
        let single = matches!(ch, '(' | ')' | '=' | '{' | '}');
        if ch.is_whitespace() || ch == ',' || single {
            if let Some(s) = start.take() {
                tokens.push(&line[s..idx]);
            }
            if single {
                tokens.push(&line[idx..idx + ch.len_utf8()]);
            }
        } else if start.is_none() {
            start = Some(idx);
        }
    }
    if let Some(s) = start {
        tokens.push(&line[s..]);
    }
    tokens
}

struct Tokens<'a> {
    toks: Vec<&'a str>,
    pos: usize,
    line: usize,
}

impl<'a> Tokens<'a> {
    fn new(toks: Vec<&'a str>, line: usize) -> Self {
        Self { toks, pos: 0, line }
    }

    fn error(&self, message: impl Into<String>) -> LoadError {
        LoadError::parse(self.line, message)
    }

    fn peek(&self) -> Option<&'a str> {
        self.toks.get(self.pos).copied()
    }

    fn next(&mut self) -> Result<&'a str, LoadError> {
        let tok = self
            .peek()
            .ok_or_else(|| self.error("unexpected end of line"))?;
        self.pos += 1;
        Ok(tok)
    }

    fn eat(&mut self, expected: &str) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &str) -> Result<(), LoadError> {
        let tok = self.next()?;
        if tok != expected {
            return Err(self.error(format!("expected `{expected}`, found `{tok}`")));
        }
        Ok(())
    }

    fn ty(&mut self) -> Result<Type, LoadError> {
        let tok = self.next()?;
        tok.parse().map_err(|e: anyhow::Error| self.error(e.to_string()))
    }

    fn local(&mut self) -> Result<Local, LoadError> {
        let tok = self.next()?;
        tok.strip_prefix('%')
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| self.error(format!("expected local, found `{tok}`")))
    }

    fn global(&mut self) -> Result<&'a str, LoadError> {
        let tok = self.next()?;
        tok.strip_prefix('@')
            .filter(|name| is_ident(name))
            .ok_or_else(|| self.error(format!("expected function name, found `{tok}`")))
    }

    fn finish(&self) -> Result<(), LoadError> {
        match self.peek() {
            None => Ok(()),
            Some(tok) => Err(self.error(format!("unexpected token `{tok}`"))),
        }
    }
}
