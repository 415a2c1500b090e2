//! Compilation of JSON selectors into the expression AST.
//!
//! A leaf condition `{type, operator, value, key?}` reads
//! `entity.<type>[.<key>]` and compares it against `value`; `and`/`or`
//! groups fold their nested conditions. The compiled AST is rooted at
//! the reserved `entity` binding.

use keel_types::{JsonOperator, JsonSelector};

use crate::ast::{CmpOp, Expr};
use crate::error::{ExprError, Result};

/// Compile a JSON selector into the AST.
pub fn compile_json_selector(selector: &JsonSelector) -> Result<Expr> {
    match selector.operator {
        JsonOperator::And | JsonOperator::Or => compile_group(selector),
        JsonOperator::Equals => compile_leaf(selector, CmpOp::Eq),
        JsonOperator::Contains => compile_leaf(selector, CmpOp::Contains),
        JsonOperator::StartsWith => compile_leaf(selector, CmpOp::StartsWith),
    }
}

fn compile_group(selector: &JsonSelector) -> Result<Expr> {
    let mut acc: Option<Expr> = None;
    for condition in &selector.conditions {
        let next = compile_json_selector(condition)?;
        acc = Some(match acc {
            None => next,
            Some(prev) => match selector.operator {
                JsonOperator::And => Expr::And(Box::new(prev), Box::new(next)),
                _ => Expr::Or(Box::new(prev), Box::new(next)),
            },
        });
    }
    acc.ok_or_else(|| ExprError::InvalidJsonSelector("empty condition group".into()))
}

fn compile_leaf(selector: &JsonSelector, op: CmpOp) -> Result<Expr> {
    if selector.field.is_empty() {
        return Err(ExprError::InvalidJsonSelector(
            "leaf condition is missing its field type".into(),
        ));
    }
    let mut path = vec!["entity".to_string(), selector.field.clone()];
    if let Some(key) = &selector.key {
        path.push(key.clone());
    }
    let rhs = literal(&selector.value)?;
    Ok(Expr::cmp(op, Expr::Path(path), rhs))
}

fn literal(value: &serde_json::Value) -> Result<Expr> {
    match value {
        serde_json::Value::String(s) => Ok(Expr::Str(s.clone())),
        serde_json::Value::Bool(b) => Ok(Expr::Bool(*b)),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Expr::Int)
            .ok_or_else(|| ExprError::InvalidJsonSelector(format!("non-integer number {n}"))),
        other => Err(ExprError::InvalidJsonSelector(format!(
            "unsupported comparison value: {other}"
        ))),
    }
}
