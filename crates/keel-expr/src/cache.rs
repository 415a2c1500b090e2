//! Cache of compiled selectors, keyed by the selector's source form.
//!
//! Selectors are re-evaluated constantly (every materializer pass,
//! every policy evaluation), so compilation results are shared behind
//! `Arc`s. Compile failures are cached too: a selector that failed
//! once keeps failing until its source form changes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use keel_types::Selector;

use crate::ast::Expr;
use crate::error::{ExprError, Result};
use crate::compile_selector;

/// Cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub compiled: usize,
    pub failed: usize,
}

#[derive(Default)]
struct CacheInner {
    compiled: HashMap<String, Arc<Expr>>,
    failed: HashMap<String, ExprError>,
}

/// Shared compiled-selector cache.
#[derive(Default)]
pub struct SelectorCache {
    inner: RwLock<CacheInner>,
}

impl SelectorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile a selector, reusing a cached result when the source
    /// form was seen before.
    pub fn compile(&self, selector: &Selector) -> Result<Arc<Expr>> {
        let key = selector.cache_key();
        {
            let inner = self.inner.read();
            if let Some(expr) = inner.compiled.get(&key) {
                return Ok(Arc::clone(expr));
            }
            if let Some(err) = inner.failed.get(&key) {
                return Err(err.clone());
            }
        }

        match compile_selector(selector) {
            Ok(expr) => {
                let expr = Arc::new(expr);
                self.inner
                    .write()
                    .compiled
                    .insert(key, Arc::clone(&expr));
                Ok(expr)
            }
            Err(err) => {
                warn!(selector = %key, error = %err, "Selector failed to compile");
                self.inner.write().failed.insert(key, err.clone());
                Err(err)
            }
        }
    }

    /// Drop every cached compilation. Used when an embedder wants to
    /// bound memory; selectors recompile lazily afterwards.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.compiled.clear();
        inner.failed.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.read();
        CacheStats {
            compiled: inner.compiled.len(),
            failed: inner.failed.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_is_cached() {
        let cache = SelectorCache::new();
        let sel = Selector::expr("resource.kind == \"Node\"");
        let a = cache.compile(&sel).unwrap();
        let b = cache.compile(&sel).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.stats().compiled, 1);
    }

    #[test]
    fn test_failures_are_cached() {
        let cache = SelectorCache::new();
        let sel = Selector::expr("resource.kind ==");
        assert!(cache.compile(&sel).is_err());
        assert!(cache.compile(&sel).is_err());
        assert_eq!(cache.stats().failed, 1);
        assert_eq!(cache.stats().compiled, 0);
    }

    #[test]
    fn test_clear() {
        let cache = SelectorCache::new();
        cache.compile(&Selector::expr("true")).unwrap();
        cache.clear();
        assert_eq!(cache.stats(), CacheStats { compiled: 0, failed: 0 });
    }

    #[test]
    fn test_distinct_forms_do_not_collide() {
        let cache = SelectorCache::new();
        cache.compile(&Selector::expr("true")).unwrap();
        let json: Selector = serde_json::from_value(serde_json::json!({
            "type": "kind", "operator": "equals", "value": "Node"
        }))
        .unwrap();
        cache.compile(&json).unwrap();
        assert_eq!(cache.stats().compiled, 2);
    }
}
