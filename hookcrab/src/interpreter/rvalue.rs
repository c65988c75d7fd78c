use crate::program::{BinOp, FloatPredicate, IntPredicate};
use crate::ty::Type;
use crate::value::TypedValue;
use anyhow::{Result, bail};
use num_traits::Float;

/// Trait for evaluating binary operations on values.
pub trait BinaryEval {
    /// Evaluates a binary operation on two values of the same type.
    ///
    /// # Arguments
    /// * `left` - Left operand value
    /// * `right` - Right operand value
    ///
    /// # Returns
    /// * `Ok(TypedValue)` - Result of the operation, with the operands' type
    /// * `Err(anyhow::Error)` - If operation fails or is unsupported
    fn eval(&self, left: &TypedValue, right: &TypedValue) -> Result<TypedValue>;
}

/// Trait for evaluating comparisons. The result is always an `i1`.
pub trait CompareEval {
    fn eval(&self, left: &TypedValue, right: &TypedValue) -> Result<TypedValue>;
}

impl BinaryEval for BinOp {
    fn eval(&self, left: &TypedValue, right: &TypedValue) -> Result<TypedValue> {
        if left.ty != right.ty {
            bail!(
                "Type mismatch in binary operation: {} on {} and {}",
                self,
                left.ty,
                right.ty
            );
        }
        match left.ty {
            Type::Int(bits) if !self.is_float() => eval_int_binop(*self, bits, left, right),
            Type::F32 if self.is_float() => {
                let (Some(l), Some(r)) = (left.as_f32(), right.as_f32()) else {
                    bail!("Malformed f32 operands for {}", self);
                };
                Ok(TypedValue::from_f32(eval_float_binop(*self, l, r)?))
            }
            Type::F64 if self.is_float() => {
                let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) else {
                    bail!("Malformed f64 operands for {}", self);
                };
                Ok(TypedValue::from_f64(eval_float_binop(*self, l, r)?))
            }
            ty => bail!("Unsupported binary operation: {} on {}", self, ty),
        }
    }
}

impl CompareEval for IntPredicate {
    fn eval(&self, left: &TypedValue, right: &TypedValue) -> Result<TypedValue> {
        if left.ty != right.ty || !left.ty.is_int() {
            bail!("Cannot compare {} with {} using icmp", left.ty, right.ty);
        }
        let (Some(ls), Some(rs), Some(lu), Some(ru)) = (
            left.as_i128(),
            right.as_i128(),
            left.as_u128(),
            right.as_u128(),
        ) else {
            bail!("Malformed integer operands for icmp {}", self);
        };
        let result = match self {
            IntPredicate::Eq => lu == ru,
            IntPredicate::Ne => lu != ru,
            IntPredicate::Slt => ls < rs,
            IntPredicate::Sle => ls <= rs,
            IntPredicate::Sgt => ls > rs,
            IntPredicate::Sge => ls >= rs,
            IntPredicate::Ult => lu < ru,
            IntPredicate::Ule => lu <= ru,
            IntPredicate::Ugt => lu > ru,
            IntPredicate::Uge => lu >= ru,
        };
        Ok(TypedValue::from_bool(result))
    }
}

impl CompareEval for FloatPredicate {
    fn eval(&self, left: &TypedValue, right: &TypedValue) -> Result<TypedValue> {
        let result = match (left.ty, right.ty) {
            (Type::F32, Type::F32) => match (left.as_f32(), right.as_f32()) {
                (Some(l), Some(r)) => eval_float_cmp(*self, l, r),
                _ => bail!("Malformed f32 operands for fcmp {}", self),
            },
            (Type::F64, Type::F64) => match (left.as_f64(), right.as_f64()) {
                (Some(l), Some(r)) => eval_float_cmp(*self, l, r),
                _ => bail!("Malformed f64 operands for fcmp {}", self),
            },
            (l, r) => bail!("Cannot compare {} with {} using fcmp", l, r),
        };
        Ok(TypedValue::from_bool(result))
    }
}

/// Evaluates a binary operation on integers of width `bits`.
///
/// Results wrap at the operand width.
fn eval_int_binop(op: BinOp, bits: u32, left: &TypedValue, right: &TypedValue) -> Result<TypedValue> {
    let ty = Type::Int(bits);
    let (Some(lu), Some(ru), Some(ls), Some(rs)) = (
        left.as_u128(),
        right.as_u128(),
        left.as_i128(),
        right.as_i128(),
    ) else {
        bail!("Malformed integer operands for {}", op);
    };
    let raw = match op {
        BinOp::Add => lu.wrapping_add(ru),
        BinOp::Sub => lu.wrapping_sub(ru),
        BinOp::Mul => lu.wrapping_mul(ru),
        BinOp::SDiv => {
            if rs == 0 {
                bail!("Division by zero");
            }
            ls.wrapping_div(rs) as u128
        }
        BinOp::UDiv => {
            if ru == 0 {
                bail!("Division by zero");
            }
            lu / ru
        }
        BinOp::SRem => {
            if rs == 0 {
                bail!("Remainder by zero");
            }
            ls.wrapping_rem(rs) as u128
        }
        BinOp::URem => {
            if ru == 0 {
                bail!("Remainder by zero");
            }
            lu % ru
        }
        BinOp::And => lu & ru,
        BinOp::Or => lu | ru,
        BinOp::Xor => lu ^ ru,
        BinOp::Shl => lu << (ru % u128::from(bits)),
        BinOp::LShr => lu >> (ru % u128::from(bits)),
        BinOp::AShr => (ls >> (ru % u128::from(bits))) as u128,
        BinOp::FAdd | BinOp::FSub | BinOp::FMul | BinOp::FDiv => {
            bail!("Unsupported integer binary operation: {}", op)
        }
    };
    TypedValue::from_int(ty, raw)
}

/// Evaluates a binary operation on floating-point values.
fn eval_float_binop<F: Float>(op: BinOp, left: F, right: F) -> Result<F> {
    match op {
        BinOp::FAdd => Ok(left + right),
        BinOp::FSub => Ok(left - right),
        BinOp::FMul => Ok(left * right),
        BinOp::FDiv => Ok(left / right),
        _ => bail!("Unsupported float binary operation: {}", op),
    }
}

/// Ordered comparison: false whenever either side is NaN.
fn eval_float_cmp<F: Float>(pred: FloatPredicate, left: F, right: F) -> bool {
    if left.is_nan() || right.is_nan() {
        return false;
    }
    match pred {
        FloatPredicate::Oeq => left == right,
        FloatPredicate::One => left != right,
        FloatPredicate::Olt => left < right,
        FloatPredicate::Ole => left <= right,
        FloatPredicate::Ogt => left > right,
        FloatPredicate::Oge => left >= right,
    }
}
