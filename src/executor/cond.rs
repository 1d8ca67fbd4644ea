//! Condition evaluation over transaction variables.

use std::collections::HashMap;

use serde_json::Value;

use crate::plan::{Cond, Operand};

use super::ExecError;

/// Evaluate a condition tree against the variable bindings.
///
/// Ordering comparisons require both sides to be numbers or both strings.
/// Equality is plain JSON equality. A reference to an unbound variable
/// resolves to `null`.
pub fn eval_cond(cond: &Cond, vars: &HashMap<String, Value>) -> Result<bool, ExecError> {
    match cond {
        Cond::Lt { left, right } => ordered(left, right, vars, |o| o.is_lt()),
        Cond::Lte { left, right } => ordered(left, right, vars, |o| o.is_le()),
        Cond::Gt { left, right } => ordered(left, right, vars, |o| o.is_gt()),
        Cond::Gte { left, right } => ordered(left, right, vars, |o| o.is_ge()),
        Cond::Eq { left, right } => Ok(resolve(left, vars) == resolve(right, vars)),
        Cond::Neq { left, right } => Ok(resolve(left, vars) != resolve(right, vars)),
        Cond::Exists { var } => Ok(vars.get(var).is_some_and(|v| !v.is_null())),
        Cond::NotExists { var } => Ok(!vars.get(var).is_some_and(|v| !v.is_null())),
        Cond::And { items } => {
            for item in items {
                if !eval_cond(item, vars)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Cond::Or { items } => {
            for item in items {
                if eval_cond(item, vars)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Cond::Not { cond } => Ok(!eval_cond(cond, vars)?),
    }
}

fn resolve(operand: &Operand, vars: &HashMap<String, Value>) -> Value {
    match operand {
        Operand::Var { var } => vars.get(var).cloned().unwrap_or(Value::Null),
        Operand::Lit(value) => value.clone(),
    }
}

fn ordered(
    left: &Operand,
    right: &Operand,
    vars: &HashMap<String, Value>,
    accept: fn(std::cmp::Ordering) -> bool,
) -> Result<bool, ExecError> {
    let l = resolve(left, vars);
    let r = resolve(right, vars);
    match (&l, &r) {
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64().unwrap_or(f64::NAN);
            let b = b.as_f64().unwrap_or(f64::NAN);
            Ok(a.partial_cmp(&b).is_some_and(accept))
        }
        (Value::String(a), Value::String(b)) => Ok(accept(a.cmp(b))),
        _ => Err(ExecError::Cond {
            message: format!(
                "Cannot order {} against {}",
                value_kind(&l),
                value_kind(&r)
            ),
        }),
    }
}

fn value_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
