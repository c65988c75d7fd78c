//! External functions available to programs through `declare`.
use super::evaluator::BaseEvaluator;
use crate::value::TypedValue;
use anyhow::{Result, anyhow, bail};
use std::io::Write;

/// Names of the external functions the evaluator provides.
pub const BUILTINS: &[&str] = &["putchar", "exit", "abort", "errno", "set_errno"];

/// Runs the external function `name`. Returns its result, if it has one.
pub(super) fn call(
    evaluator: &mut BaseEvaluator,
    name: &str,
    args: &[TypedValue],
) -> Result<Option<TypedValue>> {
    match (name, args) {
        ("putchar", [ch]) => {
            let byte = ch
                .as_u128()
                .ok_or_else(|| anyhow!("putchar expects an integer, found {}", ch.ty))?;
            evaluator.output().write_all(&[byte as u8])?;
            Ok(Some(ch.clone()))
        }
        ("exit", [code]) => {
            evaluator.unwind(code.clone());
            Ok(None)
        }
        ("abort", []) => bail!("program aborted"),
        ("errno", []) => Ok(Some(TypedValue::from_i32(evaluator.errno()))),
        ("set_errno", [code]) => {
            let code = code
                .as_i128()
                .ok_or_else(|| anyhow!("set_errno expects an integer, found {}", code.ty))?;
            evaluator.set_errno(code as i32);
            Ok(None)
        }
        _ if BUILTINS.contains(&name) => bail!(
            "External function `{}` called with {} arguments of unexpected types",
            name,
            args.len()
        ),
        _ => bail!("Call to unknown external function `{}`", name),
    }
}
