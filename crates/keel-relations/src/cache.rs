//! The relationship cache.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use keel_expr::matcher::matcher_holds;
use keel_expr::{SelectorCache, compile_matcher, match_entity};
use keel_store::EntityStore;
use keel_types::{EntityRelation, EntityType, RelationDirection, RelationshipRule};

use crate::error::{RelationError, Result};

/// Cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationStats {
    /// Entities with at least one cached relation entry.
    pub entities: usize,
    /// Total cached relations across all entities and rules.
    pub relations: usize,
    /// Entities marked fully computed.
    pub computed: usize,
    /// Rules currently marked dirty.
    pub dirty_rules: usize,
}

#[derive(Default)]
struct CacheInner {
    /// entity id → rule reference → relations.
    relations: HashMap<String, HashMap<String, Vec<EntityRelation>>>,
    /// Entities whose relations have been materialized, with their
    /// type (needed to decide which dirty rules concern them).
    computed: HashMap<String, EntityType>,
    /// entity id → rule references computed for it.
    computed_rules: HashMap<String, HashSet<String>>,
    /// Rule references whose definitions changed since their cached
    /// relations were computed.
    dirty_rules: HashSet<String>,
    /// Reverse index: endpoint entity id → entities whose cached
    /// relations reference it.
    used_in: HashMap<String, HashSet<String>>,
}

impl CacheInner {
    fn drop_entity(&mut self, id: &str) {
        self.relations.remove(id);
        self.computed.remove(id);
        self.computed_rules.remove(id);
    }
}

/// One rule's relation set for one entity, staged before commit.
struct ComputedRule {
    reference: String,
    from_type: EntityType,
    to_type: EntityType,
    relations: Vec<EntityRelation>,
}

/// Lazy, invalidating relation cache over the entity store.
pub struct RelationshipCache {
    store: Arc<EntityStore>,
    selectors: Arc<SelectorCache>,
    inner: RwLock<CacheInner>,
}

impl RelationshipCache {
    pub fn new(store: Arc<EntityStore>, selectors: Arc<SelectorCache>) -> Self {
        Self {
            store,
            selectors,
            inner: RwLock::new(CacheInner::default()),
        }
    }

    // ── Computation ─────────────────────────────────────────────────

    /// Materialize relations for one entity.
    ///
    /// Idempotent: a computed entity with no dirty rules returns
    /// immediately. Concurrent computations of the same entity
    /// converge because the commit replaces per-rule entries
    /// wholesale (last writer wins).
    ///
    /// A failed computation (entity missing) leaves no partial state
    /// behind and does not mark the entity computed.
    pub fn compute_for_entity(&self, entity_type: EntityType, id: &str) -> Result<()> {
        {
            let inner = self.inner.read();
            if inner.computed.contains_key(id) && inner.dirty_rules.is_empty() {
                return Ok(());
            }
        }

        // Snapshot phase: the cache lock is not held while entities
        // and rules are read and matched.
        let target = self
            .store
            .snapshot(entity_type, id)
            .ok_or_else(|| RelationError::EntityNotFound {
                entity_type,
                id: id.to_string(),
            })?;
        let rules = self.store.relationship_rules.items();

        let already_computed: HashSet<String> = {
            let inner = self.inner.read();
            inner
                .computed_rules
                .get(id)
                .map(|refs| {
                    refs.iter()
                        .filter(|r| !inner.dirty_rules.contains(*r))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut staged: Vec<ComputedRule> = Vec::new();
        for rule in &rules {
            if rule.from_type != entity_type && rule.to_type != entity_type {
                continue;
            }
            if already_computed.contains(&rule.reference) {
                continue;
            }
            staged.push(self.compute_rule(rule, entity_type, id, &target));
        }

        self.commit(entity_type, id, staged);
        debug!(entity = %id, "Relations computed");
        Ok(())
    }

    fn commit(&self, entity_type: EntityType, id: &str, staged: Vec<ComputedRule>) {
        let mut inner = self.inner.write();

        let touched: Vec<(String, EntityType, EntityType)> = staged
            .iter()
            .map(|s| (s.reference.clone(), s.from_type, s.to_type))
            .collect();

        for computed in staged {
            if computed.relations.is_empty() {
                if let Some(by_rule) = inner.relations.get_mut(id) {
                    by_rule.remove(&computed.reference);
                }
            } else {
                for rel in &computed.relations {
                    inner
                        .used_in
                        .entry(rel.entity_id.clone())
                        .or_default()
                        .insert(id.to_string());
                }
                inner
                    .relations
                    .entry(id.to_string())
                    .or_default()
                    .insert(computed.reference.clone(), computed.relations);
            }
            inner
                .computed_rules
                .entry(id.to_string())
                .or_default()
                .insert(computed.reference);
        }
        if inner
            .relations
            .get(id)
            .is_some_and(|by_rule| by_rule.is_empty())
        {
            inner.relations.remove(id);
        }
        inner.computed.insert(id.to_string(), entity_type);

        // A dirty rule stops being dirty once every computed entity it
        // concerns has caught up with its new definition; entities not
        // yet computed pick it up on their first full pass anyway.
        for (reference, from_type, to_type) in touched {
            if !inner.dirty_rules.contains(&reference) {
                continue;
            }
            let caught_up = inner
                .computed
                .iter()
                .filter(|(_, ty)| **ty == from_type || **ty == to_type)
                .all(|(entity, _)| {
                    inner
                        .computed_rules
                        .get(entity)
                        .is_some_and(|refs| refs.contains(&reference))
                });
            if caught_up {
                trace!(rule = %reference, "Dirty rule fully recomputed");
                inner.dirty_rules.remove(&reference);
            }
        }
    }

    /// Evaluate one rule for one entity, in both applicable
    /// directions. Selector or matcher compile failures skip with a
    /// warning; the rule still counts as computed (its source is
    /// unchanged, so retrying cannot succeed until the rule is
    /// edited, which marks it dirty).
    fn compute_rule(
        &self,
        rule: &RelationshipRule,
        entity_type: EntityType,
        id: &str,
        target: &serde_json::Value,
    ) -> ComputedRule {
        let mut computed = ComputedRule {
            reference: rule.reference.clone(),
            from_type: rule.from_type,
            to_type: rule.to_type,
            relations: Vec::new(),
        };

        let matcher = match compile_matcher(&rule.matcher) {
            Ok(expr) => expr,
            Err(err) => {
                warn!(rule = %rule.reference, error = %err, "Relationship matcher failed to compile; skipping rule");
                return computed;
            }
        };

        // Entity on the `from` side: scan `to`-typed candidates.
        if rule.from_type == entity_type {
            match match_entity(&self.selectors, rule.from_selector.as_ref(), entity_type, target) {
                Ok(true) => {
                    for (candidate_id, candidate) in self.store.snapshots_of_type(rule.to_type) {
                        if candidate_id == id {
                            continue;
                        }
                        match match_entity(
                            &self.selectors,
                            rule.to_selector.as_ref(),
                            rule.to_type,
                            &candidate,
                        ) {
                            Ok(true) if matcher_holds(&matcher, target, &candidate) => {
                                computed.relations.push(EntityRelation {
                                    rule_id: rule.id.clone(),
                                    reference: rule.reference.clone(),
                                    direction: RelationDirection::To,
                                    entity_type: rule.to_type,
                                    entity_id: candidate_id,
                                    entity: candidate,
                                });
                            }
                            Ok(_) => {}
                            Err(err) => {
                                warn!(rule = %rule.reference, error = %err, "Endpoint selector failed to compile");
                                break;
                            }
                        }
                    }
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(rule = %rule.reference, error = %err, "From-selector failed to compile; skipping direction");
                }
            }
        }

        // Entity on the `to` side: scan `from`-typed candidates.
        if rule.to_type == entity_type {
            match match_entity(&self.selectors, rule.to_selector.as_ref(), entity_type, target) {
                Ok(true) => {
                    for (candidate_id, candidate) in self.store.snapshots_of_type(rule.from_type) {
                        if candidate_id == id {
                            continue;
                        }
                        match match_entity(
                            &self.selectors,
                            rule.from_selector.as_ref(),
                            rule.from_type,
                            &candidate,
                        ) {
                            Ok(true) if matcher_holds(&matcher, &candidate, target) => {
                                computed.relations.push(EntityRelation {
                                    rule_id: rule.id.clone(),
                                    reference: rule.reference.clone(),
                                    direction: RelationDirection::From,
                                    entity_type: rule.from_type,
                                    entity_id: candidate_id,
                                    entity: candidate,
                                });
                            }
                            Ok(_) => {}
                            Err(err) => {
                                warn!(rule = %rule.reference, error = %err, "Endpoint selector failed to compile");
                                break;
                            }
                        }
                    }
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(rule = %rule.reference, error = %err, "To-selector failed to compile; skipping direction");
                }
            }
        }

        computed
    }

    /// Compute if needed, then return the entity's relations.
    pub fn get_or_compute(
        &self,
        entity_type: EntityType,
        id: &str,
    ) -> Result<HashMap<String, Vec<EntityRelation>>> {
        self.compute_for_entity(entity_type, id)?;
        Ok(self.get(id))
    }

    // ── Invalidation ────────────────────────────────────────────────

    /// Drop an entity's cached relations and cascade through the
    /// reverse index so no cached relation keeps referencing it.
    pub fn invalidate_entity(&self, id: &str) {
        let mut inner = self.inner.write();

        inner.drop_entity(id);
        if let Some(referrers) = inner.used_in.remove(id) {
            for referrer in referrers {
                trace!(entity = %id, referrer = %referrer, "Cascading relation invalidation");
                inner.drop_entity(&referrer);
            }
        }
        debug!(entity = %id, "Relations invalidated");
    }

    /// Mark a rule dirty and strip its relations everywhere. Entities
    /// that carried data or bookkeeping for the rule lose their
    /// computed mark and recompute fully on next access.
    pub fn invalidate_rule(&self, reference: &str) {
        let mut inner = self.inner.write();
        inner.dirty_rules.insert(reference.to_string());

        let mut affected: HashSet<String> = HashSet::new();
        for (entity, by_rule) in inner.relations.iter_mut() {
            if by_rule.remove(reference).is_some() {
                affected.insert(entity.clone());
            }
        }
        inner.relations.retain(|_, by_rule| !by_rule.is_empty());

        for (entity, refs) in inner.computed_rules.iter_mut() {
            if refs.remove(reference) {
                affected.insert(entity.clone());
            }
        }

        for entity in &affected {
            inner.computed.remove(entity);
        }
        debug!(rule = %reference, affected = affected.len(), "Rule invalidated");
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Relations of one entity, grouped by rule reference. Returns a
    /// defensive copy; an uncomputed or relation-less entity yields an
    /// empty map.
    pub fn get(&self, id: &str) -> HashMap<String, Vec<EntityRelation>> {
        self.inner
            .read()
            .relations
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// Relations of several entities at once. Entities with no cached
    /// relations are absent from the result.
    pub fn get_batch(&self, ids: &[&str]) -> HashMap<String, HashMap<String, Vec<EntityRelation>>> {
        let inner = self.inner.read();
        ids.iter()
            .filter_map(|id| {
                inner
                    .relations
                    .get(*id)
                    .map(|by_rule| (id.to_string(), by_rule.clone()))
            })
            .collect()
    }

    /// Every cached relation produced by one rule, keyed by owning
    /// entity.
    pub fn get_by_rule(&self, reference: &str) -> HashMap<String, Vec<EntityRelation>> {
        let inner = self.inner.read();
        inner
            .relations
            .iter()
            .filter_map(|(entity, by_rule)| {
                by_rule
                    .get(reference)
                    .map(|rels| (entity.clone(), rels.clone()))
            })
            .collect()
    }

    pub fn has_relations(&self, id: &str) -> bool {
        self.inner
            .read()
            .relations
            .get(id)
            .is_some_and(|by_rule| by_rule.values().any(|rels| !rels.is_empty()))
    }

    pub fn is_computed(&self, id: &str) -> bool {
        self.inner.read().computed.contains_key(id)
    }

    pub fn stats(&self) -> RelationStats {
        let inner = self.inner.read();
        RelationStats {
            entities: inner.relations.len(),
            relations: inner
                .relations
                .values()
                .map(|by_rule| by_rule.values().map(Vec::len).sum::<usize>())
                .sum(),
            computed: inner.computed.len(),
            dirty_rules: inner.dirty_rules.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_store::ChangeRecorder;
    use keel_types::{MatchOperator, RelationshipMatcher, Resource};
    use std::collections::BTreeMap;

    fn resource(id: &str, kind: &str, metadata: &[(&str, &str)]) -> Resource {
        Resource {
            id: id.into(),
            name: id.into(),
            kind: kind.into(),
            identifier: format!("test/{id}"),
            workspace_id: "ws-1".into(),
            metadata: metadata
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            config: serde_json::Value::Null,
            provider_id: None,
        }
    }

    fn cluster_rule(reference: &str) -> RelationshipRule {
        RelationshipRule {
            id: format!("rule-{reference}"),
            reference: reference.into(),
            from_type: EntityType::Resource,
            to_type: EntityType::Resource,
            from_selector: Some(keel_types::Selector::expr("resource.kind == \"Server\"")),
            to_selector: Some(keel_types::Selector::expr("resource.kind == \"Database\"")),
            matcher: RelationshipMatcher::Properties {
                from_property: vec!["metadata".into(), "cluster".into()],
                to_property: vec!["metadata".into(), "cluster".into()],
                operator: MatchOperator::Equals,
            },
        }
    }

    fn test_cache() -> (Arc<EntityStore>, RelationshipCache) {
        let store = Arc::new(EntityStore::new(Arc::new(ChangeRecorder::default())));
        let cache = RelationshipCache::new(Arc::clone(&store), Arc::new(SelectorCache::new()));
        (store, cache)
    }

    fn seeded() -> (Arc<EntityStore>, RelationshipCache) {
        let (store, cache) = test_cache();
        store
            .resources
            .upsert(resource("srv-1", "Server", &[("cluster", "c1")]));
        store
            .resources
            .upsert(resource("db-1", "Database", &[("cluster", "c1")]));
        store
            .resources
            .upsert(resource("db-2", "Database", &[("cluster", "c2")]));
        store.relationship_rules.upsert(cluster_rule("database"));
        (store, cache)
    }

    #[test]
    fn test_compute_links_matching_pair() {
        let (_store, cache) = seeded();
        cache
            .compute_for_entity(EntityType::Resource, "srv-1")
            .unwrap();

        assert!(cache.is_computed("srv-1"));
        let relations = cache.get("srv-1");
        let db = &relations["database"];
        assert_eq!(db.len(), 1);
        assert_eq!(db[0].entity_id, "db-1");
        assert_eq!(db[0].direction, RelationDirection::To);
        assert_eq!(db[0].entity["metadata"]["cluster"], "c1");
    }

    #[test]
    fn test_compute_reverse_direction() {
        let (_store, cache) = seeded();
        cache
            .compute_for_entity(EntityType::Resource, "db-1")
            .unwrap();

        let relations = cache.get("db-1");
        let db = &relations["database"];
        assert_eq!(db.len(), 1);
        assert_eq!(db[0].entity_id, "srv-1");
        assert_eq!(db[0].direction, RelationDirection::From);
    }

    #[test]
    fn test_compute_missing_entity() {
        let (_store, cache) = test_cache();
        let err = cache
            .compute_for_entity(EntityType::Resource, "ghost")
            .unwrap_err();
        assert!(matches!(err, RelationError::EntityNotFound { .. }));
        assert!(!cache.is_computed("ghost"));
    }

    #[test]
    fn test_compute_is_idempotent() {
        let (_store, cache) = seeded();
        cache
            .compute_for_entity(EntityType::Resource, "srv-1")
            .unwrap();
        let first = cache.get("srv-1");
        cache
            .compute_for_entity(EntityType::Resource, "srv-1")
            .unwrap();
        assert_eq!(cache.get("srv-1"), first);
        assert_eq!(cache.stats().relations, 1);
    }

    #[test]
    fn test_invalidate_entity_recomputes_identically() {
        let (_store, cache) = seeded();
        cache
            .compute_for_entity(EntityType::Resource, "srv-1")
            .unwrap();
        let before = cache.get("srv-1");

        cache.invalidate_entity("srv-1");
        assert!(!cache.is_computed("srv-1"));
        assert!(cache.get("srv-1").is_empty());

        cache
            .compute_for_entity(EntityType::Resource, "srv-1")
            .unwrap();
        assert_eq!(cache.get("srv-1"), before);
    }

    #[test]
    fn test_invalidate_endpoint_cascades() {
        let (_store, cache) = seeded();
        cache
            .compute_for_entity(EntityType::Resource, "srv-1")
            .unwrap();
        assert!(cache.has_relations("srv-1"));

        // srv-1's cached relations reference db-1, so invalidating
        // db-1 must drop srv-1's entry too.
        cache.invalidate_entity("db-1");
        assert!(!cache.is_computed("srv-1"));
        assert!(!cache.has_relations("srv-1"));
    }

    #[test]
    fn test_invalidate_rule_strips_relations() {
        let (store, cache) = seeded();
        store.relationship_rules.upsert(RelationshipRule {
            from_selector: None,
            to_selector: Some(keel_types::Selector::expr("resource.kind == \"Database\"")),
            ..cluster_rule("same-cluster")
        });
        cache
            .compute_for_entity(EntityType::Resource, "srv-1")
            .unwrap();
        assert_eq!(cache.get("srv-1").len(), 2);

        cache.invalidate_rule("database");
        assert!(cache.get_by_rule("database").is_empty());
        // The surviving rule's relations are untouched.
        assert_eq!(cache.get_by_rule("same-cluster").len(), 1);
    }

    #[test]
    fn test_dirty_rule_triggers_recompute() {
        let (store, cache) = seeded();
        cache
            .compute_for_entity(EntityType::Resource, "srv-1")
            .unwrap();
        assert_eq!(cache.get("srv-1")["database"].len(), 1);

        // Move db-2 into srv-1's cluster and re-upsert the rule.
        store
            .resources
            .upsert(resource("db-2", "Database", &[("cluster", "c1")]));
        cache.invalidate_rule("database");
        assert_eq!(cache.stats().dirty_rules, 1);

        cache
            .compute_for_entity(EntityType::Resource, "srv-1")
            .unwrap();
        assert_eq!(cache.get("srv-1")["database"].len(), 2);
        assert_eq!(cache.stats().dirty_rules, 0);
    }

    #[test]
    fn test_malformed_selector_skips_rule() {
        let (store, cache) = seeded();
        store.relationship_rules.upsert(RelationshipRule {
            from_selector: Some(keel_types::Selector::expr("resource.kind == ==")),
            ..cluster_rule("broken")
        });

        // The broken rule is skipped; the healthy one still computes.
        cache
            .compute_for_entity(EntityType::Resource, "srv-1")
            .unwrap();
        assert!(cache.is_computed("srv-1"));
        let relations = cache.get("srv-1");
        assert!(relations.contains_key("database"));
        assert!(!relations.contains_key("broken"));
    }

    #[test]
    fn test_self_relation_excluded() {
        let (store, cache) = test_cache();
        store
            .resources
            .upsert(resource("srv-1", "Server", &[("cluster", "c1")]));
        store.relationship_rules.upsert(RelationshipRule {
            id: "rule-self".into(),
            reference: "peers".into(),
            from_type: EntityType::Resource,
            to_type: EntityType::Resource,
            from_selector: None,
            to_selector: None,
            matcher: RelationshipMatcher::Properties {
                from_property: vec!["metadata".into(), "cluster".into()],
                to_property: vec!["metadata".into(), "cluster".into()],
                operator: MatchOperator::Equals,
            },
        });

        cache
            .compute_for_entity(EntityType::Resource, "srv-1")
            .unwrap();
        assert!(!cache.has_relations("srv-1"));
    }

    #[test]
    fn test_get_batch() {
        let (_store, cache) = seeded();
        cache
            .compute_for_entity(EntityType::Resource, "srv-1")
            .unwrap();
        cache
            .compute_for_entity(EntityType::Resource, "db-2")
            .unwrap();

        let batch = cache.get_batch(&["srv-1", "db-2", "ghost"]);
        assert!(batch.contains_key("srv-1"));
        // db-2 computed but has no relations; ghost never existed.
        assert!(!batch.contains_key("db-2"));
        assert!(!batch.contains_key("ghost"));
    }

    // Universal invariant: a cached computation equals a from-scratch
    // compute on never-cached state.
    #[test]
    fn test_fresh_compute_matches_never_cached() {
        let (_store, cache) = seeded();
        cache
            .compute_for_entity(EntityType::Resource, "srv-1")
            .unwrap();
        let cached = cache.get("srv-1");

        let (_store2, fresh) = seeded();
        fresh
            .compute_for_entity(EntityType::Resource, "srv-1")
            .unwrap();
        assert_eq!(fresh.get("srv-1"), cached);
    }
}
