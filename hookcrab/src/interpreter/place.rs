//! Operand and destination handling.
//!
//! Reads operands out of the running frame and writes instruction results back
//! into it, checking that every value carries the type the instruction expects.

use super::evaluator::BaseEvaluator;
use crate::program::{Instruction, Literal, Local, Operand};
use crate::ty::Type;
use crate::value::TypedValue;
use anyhow::{Result, anyhow, bail};

impl BaseEvaluator {
    /// Evaluates an operand in the top frame, expecting type `ty`.
    pub(super) fn evaluate_operand(&self, operand: &Operand, ty: Type) -> Result<TypedValue> {
        match operand {
            Operand::Local(local) => {
                let value = self.read_local(*local)?;
                if value.ty != ty {
                    bail!("Local %{} has type {}, expected {}", local, value.ty, ty);
                }
                Ok(value.clone())
            }
            Operand::Const(lit) => evaluate_literal(*lit, ty),
        }
    }

    /// Evaluates the source of a `copy`, reinterpreting locals as `ty`.
    pub(super) fn copy_operand(&self, operand: &Operand, ty: Type) -> Result<TypedValue> {
        match operand {
            Operand::Local(local) => self.read_local(*local)?.clone().retag(ty),
            Operand::Const(lit) => evaluate_literal(*lit, ty),
        }
    }

    /// Stores the result of `instr` into its destination local, if it has one.
    pub(super) fn assign_result(&mut self, instr: &Instruction, value: TypedValue) -> Result<()> {
        match instr.dest {
            Some(dest) => self.write_local(dest, value),
            None => Ok(()),
        }
    }

    pub(super) fn read_local(&self, local: Local) -> Result<&TypedValue> {
        self.stack()
            .top()
            .ok_or_else(|| anyhow!("No active frame to read %{} from", local))?
            .read_local(local)
    }

    pub(super) fn write_local(&mut self, local: Local, value: TypedValue) -> Result<()> {
        self.stack_mut()
            .top_mut()
            .ok_or_else(|| anyhow!("No active frame to write %{} to", local))?
            .write_local(local, value)
    }
}

/// Materializes a constant operand with the type of the instruction using it.
pub(super) fn evaluate_literal(lit: Literal, ty: Type) -> Result<TypedValue> {
    match (lit, ty) {
        (Literal::Int(i), Type::Int(_)) => TypedValue::from_int(ty, i as u128),
        (Literal::Int(i), Type::F32) => Ok(TypedValue::from_f32(i as f32)),
        (Literal::Int(i), Type::F64) => Ok(TypedValue::from_f64(i as f64)),
        (Literal::Float(x), Type::F32) => Ok(TypedValue::from_f32(x as f32)),
        (Literal::Float(x), Type::F64) => Ok(TypedValue::from_f64(x)),
        _ => bail!("Constant {} cannot have type {}", lit, ty),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_literal() {
        let v = evaluate_literal(Literal::Int(-1), Type::I8).unwrap();
        assert_eq!(v, TypedValue::from_i8(-1));
        let v = evaluate_literal(Literal::Int(1), Type::I1).unwrap();
        assert_eq!(v.as_bool(), Some(true));
    }

    #[test]
    fn test_float_literal() {
        assert_eq!(
            evaluate_literal(Literal::Int(2), Type::F64).unwrap(),
            TypedValue::from_f64(2.0)
        );
        assert_eq!(
            evaluate_literal(Literal::Float(0.5), Type::F32).unwrap(),
            TypedValue::from_f32(0.5)
        );
    }

    #[test]
    fn test_invalid_literal() {
        assert!(evaluate_literal(Literal::Float(0.5), Type::I32).is_err());
        assert!(evaluate_literal(Literal::Int(0), Type::Ptr).is_err());
        assert!(evaluate_literal(Literal::Int(0), Type::Void).is_err());
    }
}
