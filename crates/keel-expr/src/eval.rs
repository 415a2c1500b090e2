//! AST evaluation.
//!
//! Evaluation is total: it cannot fail and it cannot panic. A path
//! that resolves to nothing yields `Undefined`, which equals nothing:
//! every comparison involving it (including `!=`) is false.

use serde_json::Value;

use crate::ast::{CmpOp, Expr};
use crate::context::Context;

/// The result of evaluating a sub-expression.
#[derive(Debug, Clone, PartialEq)]
enum Evaluated {
    Defined(Value),
    Undefined,
}

/// Evaluate an expression to a boolean.
///
/// Non-boolean results (a bare path yielding a string, an undefined
/// path) are not truthy.
pub fn eval_bool(expr: &Expr, ctx: &Context) -> bool {
    match eval(expr, ctx) {
        Evaluated::Defined(Value::Bool(b)) => b,
        _ => false,
    }
}

fn eval(expr: &Expr, ctx: &Context) -> Evaluated {
    match expr {
        Expr::Bool(b) => Evaluated::Defined(Value::Bool(*b)),
        Expr::Str(s) => Evaluated::Defined(Value::String(s.clone())),
        Expr::Int(i) => Evaluated::Defined(Value::Number((*i).into())),
        Expr::Path(path) => match ctx.resolve(path) {
            Some(v) => Evaluated::Defined(v.clone()),
            None => Evaluated::Undefined,
        },
        Expr::Not(inner) => Evaluated::Defined(Value::Bool(!eval_bool(inner, ctx))),
        Expr::And(lhs, rhs) => {
            Evaluated::Defined(Value::Bool(eval_bool(lhs, ctx) && eval_bool(rhs, ctx)))
        }
        Expr::Or(lhs, rhs) => {
            Evaluated::Defined(Value::Bool(eval_bool(lhs, ctx) || eval_bool(rhs, ctx)))
        }
        Expr::Cmp { op, lhs, rhs } => {
            let lhs = eval(lhs, ctx);
            let rhs = eval(rhs, ctx);
            Evaluated::Defined(Value::Bool(compare(*op, &lhs, &rhs)))
        }
    }
}

fn compare(op: CmpOp, lhs: &Evaluated, rhs: &Evaluated) -> bool {
    // Undefined equals nothing; all comparisons against it are false.
    let (Evaluated::Defined(lhs), Evaluated::Defined(rhs)) = (lhs, rhs) else {
        return false;
    };
    match op {
        CmpOp::Eq => lhs == rhs,
        CmpOp::Ne => lhs != rhs,
        CmpOp::Contains => contains(lhs, rhs),
        CmpOp::StartsWith => match (lhs, rhs) {
            (Value::String(l), Value::String(r)) => l.starts_with(r.as_str()),
            _ => false,
        },
    }
}

fn contains(lhs: &Value, rhs: &Value) -> bool {
    match lhs {
        Value::String(l) => match rhs {
            Value::String(r) => l.contains(r.as_str()),
            _ => false,
        },
        Value::Array(items) => items.contains(rhs),
        _ => false,
    }
}
