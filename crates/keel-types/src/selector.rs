//! Selector surface forms.
//!
//! A selector is a predicate over a bound entity context. It arrives
//! either as an expression string (see the grammar in `keel-expr`) or
//! as a structured JSON predicate. Compilation of both forms lives in
//! `keel-expr`; this module only carries the data.

use serde::{Deserialize, Serialize};

/// A selector in one of its two surface forms.
///
/// Serialized untagged: a JSON string deserializes as `Expr`, an
/// object as `Json`. "No selector" is represented by
/// `Option<Selector>::None` and always matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Selector {
    Expr(String),
    Json(JsonSelector),
}

impl Selector {
    /// Convenience constructor for expression selectors.
    pub fn expr(src: impl Into<String>) -> Self {
        Self::Expr(src.into())
    }

    /// A stable cache key for the compiled form of this selector.
    pub fn cache_key(&self) -> String {
        match self {
            Self::Expr(src) => format!("expr:{src}"),
            // Serialization of JsonSelector is deterministic (struct
            // field order), so the JSON text is a usable identity.
            Self::Json(sel) => {
                format!("json:{}", serde_json::to_string(sel).unwrap_or_default())
            }
        }
    }
}

/// Comparison and grouping operators of the JSON selector form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JsonOperator {
    Equals,
    Contains,
    StartsWith,
    And,
    Or,
}

/// A structured JSON predicate: `entity.<type>[.<key>] <op> <value>`,
/// or a boolean group of nested conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonSelector {
    /// Field of the entity this condition reads: `name`, `kind`,
    /// `identifier`, `metadata`, ... Ignored for `and`/`or` groups.
    #[serde(rename = "type", default)]
    pub field: String,

    pub operator: JsonOperator,

    /// Comparison value. Ignored for `and`/`or` groups.
    #[serde(default)]
    pub value: serde_json::Value,

    /// Sub-key for map-valued fields (`metadata`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Nested conditions for `and`/`or` groups.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<JsonSelector>,
}
