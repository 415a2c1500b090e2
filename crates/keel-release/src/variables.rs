//! Variable resolution for one release target.
//!
//! Priority, lowest to highest: the deployment variable's default,
//! then selector-scoped values ordered by their priority integer,
//! then a resource variable pinned to the target's resource. The
//! highest-priority source that actually resolves wins; an
//! unresolvable reference falls through silently so defaults can
//! guard against partial data.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{trace, warn};

use keel_expr::{SelectorCache, match_entity};
use keel_relations::RelationshipCache;
use keel_store::EntityStore;
use keel_types::{EntityType, VariableSource, VariableValue};

use crate::context::TargetContext;

/// Resolves deployment-variable values per release target.
pub struct VariableResolver {
    store: Arc<EntityStore>,
    selectors: Arc<SelectorCache>,
    relations: Arc<RelationshipCache>,
}

impl VariableResolver {
    pub fn new(
        store: Arc<EntityStore>,
        selectors: Arc<SelectorCache>,
        relations: Arc<RelationshipCache>,
    ) -> Self {
        Self {
            store,
            selectors,
            relations,
        }
    }

    /// Resolve every variable key of the target's deployment. Keys
    /// with no resolvable value are absent from the result.
    pub fn resolve(&self, ctx: &TargetContext) -> BTreeMap<String, serde_json::Value> {
        let mut resolved = BTreeMap::new();

        for variable in self.store.variables_for_deployment(&ctx.key.deployment_id) {
            let mut current: Option<serde_json::Value> = variable.default_value.clone();

            // Matching values applied lowest priority first, so later
            // (higher-priority) resolvable values override. Equal
            // priorities apply in descending id order, making the
            // smallest id the deterministic winner of a tie.
            let mut values: Vec<&VariableValue> = variable.values.iter().collect();
            values.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| b.id.cmp(&a.id)));

            for value in values {
                if !self.value_in_scope(value, ctx) {
                    continue;
                }
                if let Some(v) = self.resolve_source(&value.value, ctx) {
                    current = Some(v);
                } else {
                    trace!(
                        variable = %variable.key,
                        value = %value.id,
                        "Variable value unresolvable; falling through"
                    );
                }
            }

            // A resource variable overrides everything when it
            // resolves; when it does not, the deployment-level result
            // stands.
            if let Some(pinned) = self
                .store
                .resource_variable(&ctx.key.resource_id, &variable.key)
            {
                if let Some(v) = self.resolve_source(&pinned.value, ctx) {
                    current = Some(v);
                }
            }

            if let Some(v) = current {
                resolved.insert(variable.key.clone(), v);
            }
        }

        resolved
    }

    fn value_in_scope(&self, value: &VariableValue, ctx: &TargetContext) -> bool {
        match match_entity(
            &self.selectors,
            value.resource_selector.as_ref(),
            EntityType::Resource,
            &ctx.resource,
        ) {
            Ok(matched) => matched,
            Err(err) => {
                warn!(value = %value.id, error = %err, "Variable value selector failed to compile");
                false
            }
        }
    }

    /// Resolve a source to a concrete value, or `None` when it is
    /// unresolvable (missing relation, missing path segment).
    fn resolve_source(
        &self,
        source: &VariableSource,
        ctx: &TargetContext,
    ) -> Option<serde_json::Value> {
        match source {
            VariableSource::Literal(value) => Some(value.clone()),
            VariableSource::Reference { reference, path } => {
                let relations = match self
                    .relations
                    .get_or_compute(EntityType::Resource, &ctx.key.resource_id)
                {
                    Ok(relations) => relations,
                    Err(err) => {
                        warn!(resource = %ctx.key.resource_id, error = %err, "Relation lookup failed during variable resolution");
                        return None;
                    }
                };
                let mut related = relations.get(reference)?.clone();
                if related.is_empty() {
                    return None;
                }
                // Deterministic pick among multiple matches.
                related.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
                let mut value = &related[0].entity;
                for segment in path {
                    value = match value {
                        serde_json::Value::Object(map) => map.get(segment)?,
                        _ => return None,
                    };
                }
                Some(value.clone())
            }
        }
    }
}
