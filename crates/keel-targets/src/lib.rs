//! Release-target materializer.
//!
//! Maintains the derived set of `(environment, deployment, resource)`
//! triples: a release target exists exactly when the environment's
//! and the deployment's resource selectors both match the resource and
//! the two share an existing system. The set is maintained
//! incrementally: a change to an environment, deployment, or resource
//! recomputes only the slice of the set that entity participates in,
//! and the caller receives the resulting diff to drive re-evaluation.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use keel_expr::{SelectorCache, match_entity};
use keel_store::EntityStore;
use keel_types::{EntityType, ReleaseTargetKey, Selector};

/// The outcome of one incremental recomputation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetDiff {
    pub added: Vec<ReleaseTargetKey>,
    pub removed: Vec<ReleaseTargetKey>,
}

impl TargetDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Every key affected by this diff, added and removed alike.
    pub fn changed(&self) -> impl Iterator<Item = &ReleaseTargetKey> {
        self.added.iter().chain(self.removed.iter())
    }
}

/// Materializer statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetStats {
    pub targets: usize,
}

/// Incrementally maintained release-target set.
pub struct TargetMaterializer {
    store: Arc<EntityStore>,
    selectors: Arc<SelectorCache>,
    targets: RwLock<BTreeSet<ReleaseTargetKey>>,
}

impl TargetMaterializer {
    pub fn new(store: Arc<EntityStore>, selectors: Arc<SelectorCache>) -> Self {
        Self {
            store,
            selectors,
            targets: RwLock::new(BTreeSet::new()),
        }
    }

    // ── Incremental recomputation ───────────────────────────────────

    /// Recompute every target the environment participates in. A
    /// deleted environment contributes nothing and its targets drop
    /// out through the diff.
    pub fn recompute_environment(&self, environment_id: &str) -> TargetDiff {
        let mut next: BTreeSet<ReleaseTargetKey> = BTreeSet::new();

        if let Some(env) = self.store.environments.get(environment_id) {
            if self.store.systems.contains(&env.system_id) {
                for (resource_id, snapshot) in self.store.snapshots_of_type(EntityType::Resource) {
                    if !self.matches(env.resource_selector.as_ref(), &snapshot) {
                        continue;
                    }
                    for dep in self.store.deployments_in_system(&env.system_id) {
                        if self.matches(dep.resource_selector.as_ref(), &snapshot) {
                            next.insert(ReleaseTargetKey::new(
                                environment_id,
                                dep.id.clone(),
                                resource_id.clone(),
                            ));
                        }
                    }
                }
            }
        }

        self.replace_slice(|key| key.environment_id == environment_id, next)
    }

    /// Recompute every target the deployment participates in.
    pub fn recompute_deployment(&self, deployment_id: &str) -> TargetDiff {
        let mut next: BTreeSet<ReleaseTargetKey> = BTreeSet::new();

        if let Some(dep) = self.store.deployments.get(deployment_id) {
            if self.store.systems.contains(&dep.system_id) {
                for (resource_id, snapshot) in self.store.snapshots_of_type(EntityType::Resource) {
                    if !self.matches(dep.resource_selector.as_ref(), &snapshot) {
                        continue;
                    }
                    for env in self.store.environments_in_system(&dep.system_id) {
                        if self.matches(env.resource_selector.as_ref(), &snapshot) {
                            next.insert(ReleaseTargetKey::new(
                                env.id.clone(),
                                deployment_id,
                                resource_id.clone(),
                            ));
                        }
                    }
                }
            }
        }

        self.replace_slice(|key| key.deployment_id == deployment_id, next)
    }

    /// Recompute every target the resource participates in.
    pub fn recompute_resource(&self, resource_id: &str) -> TargetDiff {
        let mut next: BTreeSet<ReleaseTargetKey> = BTreeSet::new();

        if let Some(snapshot) = self.store.snapshot(EntityType::Resource, resource_id) {
            for env in self.store.environments.items() {
                if !self.store.systems.contains(&env.system_id) {
                    continue;
                }
                if !self.matches(env.resource_selector.as_ref(), &snapshot) {
                    continue;
                }
                for dep in self.store.deployments_in_system(&env.system_id) {
                    if self.matches(dep.resource_selector.as_ref(), &snapshot) {
                        next.insert(ReleaseTargetKey::new(
                            env.id.clone(),
                            dep.id.clone(),
                            resource_id,
                        ));
                    }
                }
            }
        }

        self.replace_slice(|key| key.resource_id == resource_id, next)
    }

    /// Replace the slice of the target set selected by `in_slice` with
    /// `next`, returning what appeared and disappeared.
    fn replace_slice<F>(&self, in_slice: F, next: BTreeSet<ReleaseTargetKey>) -> TargetDiff
    where
        F: Fn(&ReleaseTargetKey) -> bool,
    {
        let mut targets = self.targets.write();

        let previous: BTreeSet<ReleaseTargetKey> =
            targets.iter().filter(|k| in_slice(k)).cloned().collect();

        let added: Vec<ReleaseTargetKey> = next.difference(&previous).cloned().collect();
        let removed: Vec<ReleaseTargetKey> = previous.difference(&next).cloned().collect();

        for key in &removed {
            targets.remove(key);
        }
        for key in &added {
            targets.insert(key.clone());
        }

        if !(added.is_empty() && removed.is_empty()) {
            debug!(
                added = added.len(),
                removed = removed.len(),
                "Release-target set changed"
            );
        }
        TargetDiff { added, removed }
    }

    fn matches(&self, selector: Option<&Selector>, snapshot: &serde_json::Value) -> bool {
        match match_entity(&self.selectors, selector, EntityType::Resource, snapshot) {
            Ok(matched) => matched,
            Err(err) => {
                // Invalid selectors count as no match; the error is
                // surfaced to observability, never to the reconciler.
                warn!(error = %err, "Resource selector failed to compile");
                false
            }
        }
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn contains(&self, key: &ReleaseTargetKey) -> bool {
        self.targets.read().contains(key)
    }

    pub fn all(&self) -> BTreeSet<ReleaseTargetKey> {
        self.targets.read().clone()
    }

    pub fn len(&self) -> usize {
        self.targets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.read().is_empty()
    }

    pub fn stats(&self) -> TargetStats {
        TargetStats { targets: self.len() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_store::ChangeRecorder;
    use keel_types::{Deployment, Environment, Resource, System};
    use std::collections::BTreeMap;

    fn resource(id: &str, kind: &str) -> Resource {
        Resource {
            id: id.into(),
            name: id.into(),
            kind: kind.into(),
            identifier: format!("test/{id}"),
            workspace_id: "ws-1".into(),
            metadata: BTreeMap::new(),
            config: serde_json::Value::Null,
            provider_id: None,
        }
    }

    fn deployment(id: &str, system_id: &str, selector: Option<Selector>) -> Deployment {
        Deployment {
            id: id.into(),
            name: id.into(),
            slug: id.into(),
            system_id: system_id.into(),
            resource_selector: selector,
            job_agent_config: serde_json::Value::Null,
        }
    }

    fn environment(id: &str, system_id: &str, selector: Option<Selector>) -> Environment {
        Environment {
            id: id.into(),
            name: id.into(),
            system_id: system_id.into(),
            resource_selector: selector,
        }
    }

    fn system(id: &str) -> System {
        System {
            id: id.into(),
            name: id.into(),
            workspace_id: "ws-1".into(),
        }
    }

    fn setup() -> (Arc<EntityStore>, TargetMaterializer) {
        let store = Arc::new(EntityStore::new(Arc::new(ChangeRecorder::default())));
        let materializer =
            TargetMaterializer::new(Arc::clone(&store), Arc::new(SelectorCache::new()));
        (store, materializer)
    }

    #[test]
    fn test_join_on_both_selectors_and_system() {
        let (store, materializer) = setup();
        store.systems.upsert(system("sys-1"));
        store.environments.upsert(environment("env-1", "sys-1", None));
        store.deployments.upsert(deployment(
            "dep-1",
            "sys-1",
            Some(Selector::expr("resource.kind == \"Node\"")),
        ));
        store.resources.upsert(resource("node-1", "Node"));
        store.resources.upsert(resource("pod-1", "Pod"));
        store.resources.upsert(resource("node-2", "Node"));

        let diff = materializer.recompute_environment("env-1");
        assert_eq!(diff.added.len(), 2);
        assert!(diff.removed.is_empty());
        assert!(materializer.contains(&ReleaseTargetKey::new("env-1", "dep-1", "node-1")));
        assert!(materializer.contains(&ReleaseTargetKey::new("env-1", "dep-1", "node-2")));
        assert!(!materializer.contains(&ReleaseTargetKey::new("env-1", "dep-1", "pod-1")));
    }

    #[test]
    fn test_cross_system_pairs_excluded() {
        let (store, materializer) = setup();
        store.systems.upsert(system("sys-1"));
        store.systems.upsert(system("sys-2"));
        store.environments.upsert(environment("env-1", "sys-1", None));
        store.deployments.upsert(deployment("dep-other", "sys-2", None));
        store.resources.upsert(resource("node-1", "Node"));

        let diff = materializer.recompute_environment("env-1");
        assert!(diff.is_empty());
        assert!(materializer.is_empty());
    }

    #[test]
    fn test_missing_system_contributes_nothing() {
        let (store, materializer) = setup();
        store.environments.upsert(environment("env-1", "ghost-sys", None));
        store.deployments.upsert(deployment("dep-1", "ghost-sys", None));
        store.resources.upsert(resource("node-1", "Node"));

        assert!(materializer.recompute_environment("env-1").is_empty());
    }

    #[test]
    fn test_resource_change_adds_and_removes() {
        let (store, materializer) = setup();
        store.systems.upsert(system("sys-1"));
        store.environments.upsert(environment("env-1", "sys-1", None));
        store.deployments.upsert(deployment(
            "dep-1",
            "sys-1",
            Some(Selector::expr("resource.kind == \"Node\"")),
        ));
        store.resources.upsert(resource("res-1", "Node"));

        let diff = materializer.recompute_resource("res-1");
        assert_eq!(diff.added.len(), 1);

        // The resource changes kind and no longer matches.
        store.resources.upsert(resource("res-1", "Pod"));
        let diff = materializer.recompute_resource("res-1");
        assert!(diff.added.is_empty());
        assert_eq!(diff.removed.len(), 1);
        assert!(materializer.is_empty());
    }

    #[test]
    fn test_deleted_environment_drops_targets() {
        let (store, materializer) = setup();
        store.systems.upsert(system("sys-1"));
        store.environments.upsert(environment("env-1", "sys-1", None));
        store.deployments.upsert(deployment("dep-1", "sys-1", None));
        store.resources.upsert(resource("res-1", "Node"));
        materializer.recompute_environment("env-1");
        assert_eq!(materializer.len(), 1);

        store.environments.remove("env-1");
        let diff = materializer.recompute_environment("env-1");
        assert_eq!(diff.removed.len(), 1);
        assert!(materializer.is_empty());
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let (store, materializer) = setup();
        store.systems.upsert(system("sys-1"));
        store.environments.upsert(environment("env-1", "sys-1", None));
        store.deployments.upsert(deployment("dep-1", "sys-1", None));
        store.resources.upsert(resource("res-1", "Node"));

        let first = materializer.recompute_environment("env-1");
        assert_eq!(first.added.len(), 1);
        let second = materializer.recompute_environment("env-1");
        assert!(second.is_empty());
        assert_eq!(materializer.len(), 1);
    }

    #[test]
    fn test_deployment_recompute_only_touches_its_slice() {
        let (store, materializer) = setup();
        store.systems.upsert(system("sys-1"));
        store.environments.upsert(environment("env-1", "sys-1", None));
        store.deployments.upsert(deployment("dep-1", "sys-1", None));
        store.deployments.upsert(deployment("dep-2", "sys-1", None));
        store.resources.upsert(resource("res-1", "Node"));
        materializer.recompute_environment("env-1");
        assert_eq!(materializer.len(), 2);

        // dep-2 narrows its selector away from res-1; dep-1's target
        // must survive.
        store.deployments.upsert(deployment(
            "dep-2",
            "sys-1",
            Some(Selector::expr("resource.kind == \"Pod\"")),
        ));
        let diff = materializer.recompute_deployment("dep-2");
        assert_eq!(diff.removed.len(), 1);
        assert!(materializer.contains(&ReleaseTargetKey::new("env-1", "dep-1", "res-1")));
        assert_eq!(materializer.len(), 1);
    }

    #[test]
    fn test_invalid_selector_is_no_match() {
        let (store, materializer) = setup();
        store.systems.upsert(system("sys-1"));
        store.environments.upsert(environment(
            "env-1",
            "sys-1",
            Some(Selector::expr("resource.kind ==")),
        ));
        store.deployments.upsert(deployment("dep-1", "sys-1", None));
        store.resources.upsert(resource("res-1", "Node"));

        let diff = materializer.recompute_environment("env-1");
        assert!(diff.is_empty());
    }
}
