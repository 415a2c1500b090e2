//! Evaluation context: named entity bindings.

use std::collections::BTreeMap;

/// A set of named `serde_json::Value` bindings an expression is
/// evaluated against. Which names are bound depends on scope:
/// `resource`/`deployment`/`environment`/`version` for policies,
/// `from`/`to` for relationship matchers, `entity` plus the type name
/// for single-entity selectors.
#[derive(Debug, Clone, Default)]
pub struct Context {
    bindings: BTreeMap<String, serde_json::Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to a value, replacing any prior binding.
    pub fn bind(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.bindings.insert(name.into(), value);
        self
    }

    /// Resolve a path. Returns `None` ("undefined") when the root
    /// binding is absent or any segment is missing along the way.
    pub fn resolve(&self, path: &[String]) -> Option<&serde_json::Value> {
        let (root, rest) = path.split_first()?;
        let mut current = self.bindings.get(root)?;
        for segment in rest {
            current = match current {
                serde_json::Value::Object(map) => map.get(segment)?,
                _ => return None,
            };
        }
        Some(current)
    }
}
