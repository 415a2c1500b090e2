//! Expression language and selector matching for Keel.
//!
//! Selectors arrive in two surface forms (expression strings and
//! structured JSON predicates), and both compile to the same small
//! boolean AST, evaluated over a context of named `serde_json::Value`
//! bindings (`resource`, `deployment`, `environment`, `version` in
//! policy scope; `from`, `to` in relationship-matcher scope).
//!
//! The evaluator is deterministic, side-effect free, and panic-safe:
//! malformed input yields an error at compile time, and a missing
//! field at evaluation time yields an "undefined" sentinel that equals
//! nothing.

pub mod ast;
pub mod cache;
pub mod context;
pub mod error;
pub mod eval;
pub mod json;
pub mod lexer;
pub mod matcher;
pub mod parser;

pub use ast::{CmpOp, Expr};
pub use cache::{CacheStats, SelectorCache};
pub use context::Context;
pub use error::{ExprError, Result};
pub use json::compile_json_selector;
pub use matcher::compile_matcher;
pub use parser::parse;

use keel_types::{EntityType, Selector};

/// Compile a selector (either surface form) into the shared AST.
pub fn compile_selector(selector: &Selector) -> Result<Expr> {
    match selector {
        Selector::Expr(src) => parse(src),
        Selector::Json(sel) => compile_json_selector(sel),
    }
}

/// Evaluate an optional selector against a context.
///
/// `None` always matches. Errors surface to the caller, which treats
/// them as no-match and reports them; they never abort a reconciler.
pub fn match_selector(
    cache: &SelectorCache,
    selector: Option<&Selector>,
    ctx: &Context,
) -> Result<bool> {
    let Some(selector) = selector else {
        return Ok(true);
    };
    let expr = cache.compile(selector)?;
    Ok(eval::eval_bool(&expr, ctx))
}

/// Evaluate an optional selector against a single entity snapshot.
///
/// The entity is bound both under its type name (so expression
/// selectors can say `resource.kind == "Node"`) and under the
/// reserved name `entity` (the root of compiled JSON selectors).
pub fn match_entity(
    cache: &SelectorCache,
    selector: Option<&Selector>,
    entity_type: EntityType,
    snapshot: &serde_json::Value,
) -> Result<bool> {
    let Some(selector) = selector else {
        return Ok(true);
    };
    let ctx = Context::new()
        .bind("entity", snapshot.clone())
        .bind(entity_type.binding(), snapshot.clone());
    let expr = cache.compile(selector)?;
    Ok(eval::eval_bool(&expr, &ctx))
}
