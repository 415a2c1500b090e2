//! Compilation of relationship matchers.
//!
//! A matcher decides whether two concrete entities are related. The
//! expression form binds them as `from` and `to`; the property form
//! `{from_property, to_property, operator}` compiles to
//! `from.<path> <op> to.<path>`.

use keel_types::{MatchOperator, RelationshipMatcher};

use crate::ast::{CmpOp, Expr};
use crate::context::Context;
use crate::error::Result;
use crate::eval::eval_bool;
use crate::parser::parse;

/// Compile a relationship matcher into the shared AST.
pub fn compile_matcher(matcher: &RelationshipMatcher) -> Result<Expr> {
    match matcher {
        RelationshipMatcher::Expr(src) => parse(src),
        RelationshipMatcher::Properties {
            from_property,
            to_property,
            operator,
        } => {
            let mut from_path = vec!["from".to_string()];
            from_path.extend(from_property.iter().cloned());
            let mut to_path = vec!["to".to_string()];
            to_path.extend(to_property.iter().cloned());
            let op = match operator {
                MatchOperator::Equals => CmpOp::Eq,
                MatchOperator::Contains => CmpOp::Contains,
                MatchOperator::StartsWith => CmpOp::StartsWith,
            };
            Ok(Expr::cmp(op, Expr::Path(from_path), Expr::Path(to_path)))
        }
    }
}

/// Evaluate a compiled matcher against a concrete `(from, to)` pair.
pub fn matcher_holds(expr: &Expr, from: &serde_json::Value, to: &serde_json::Value) -> bool {
    let ctx = Context::new()
        .bind("from", from.clone())
        .bind("to", to.clone());
    eval_bool(expr, &ctx)
}
