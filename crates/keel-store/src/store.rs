//! Typed entity maps and the aggregate store.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use keel_types::{
    ApprovalRecord, ChangedEntity, Deployment, DeploymentVariable, DeploymentVersion, EntityType,
    Environment, Policy, PolicySkip, RelationshipRule, Resource, ResourceVariable, System,
};

use crate::error::{Result, StoreError};
use crate::recorder::ChangeRecorder;

/// A storable entity: serializable, identified, tagged with its
/// change-record kind.
pub trait EntityRecord: Clone + PartialEq + Send + Sync + Serialize + 'static {
    const KIND: ChangedEntity;
    const NAME: &'static str;

    fn id(&self) -> &str;
}

macro_rules! entity_record {
    ($ty:ty, $kind:expr, $name:literal) => {
        impl EntityRecord for $ty {
            const KIND: ChangedEntity = $kind;
            const NAME: &'static str = $name;

            fn id(&self) -> &str {
                &self.id
            }
        }
    };
}

entity_record!(Resource, ChangedEntity::Resource, "resource");
entity_record!(Deployment, ChangedEntity::Deployment, "deployment");
entity_record!(Environment, ChangedEntity::Environment, "environment");
entity_record!(System, ChangedEntity::System, "system");
entity_record!(
    DeploymentVersion,
    ChangedEntity::DeploymentVersion,
    "deployment version"
);
entity_record!(
    DeploymentVariable,
    ChangedEntity::DeploymentVariable,
    "deployment variable"
);
entity_record!(
    ResourceVariable,
    ChangedEntity::ResourceVariable,
    "resource variable"
);
entity_record!(Policy, ChangedEntity::Policy, "policy");
entity_record!(PolicySkip, ChangedEntity::PolicySkip, "policy skip");
entity_record!(ApprovalRecord, ChangedEntity::ApprovalRecord, "approval");
entity_record!(
    RelationshipRule,
    ChangedEntity::RelationshipRule,
    "relationship rule"
);

/// One concurrent map of entities, keyed by ID, with replace-on-write
/// semantics and change recording.
pub struct TypedStore<T: EntityRecord> {
    items: RwLock<HashMap<String, Arc<T>>>,
    recorder: Arc<ChangeRecorder>,
}

impl<T: EntityRecord> TypedStore<T> {
    fn new(recorder: Arc<ChangeRecorder>) -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            recorder,
        }
    }

    /// Insert or replace. An upsert identical to the stored value is
    /// a logical no-op and records no change. Returns the stored
    /// `Arc`.
    pub fn upsert(&self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        let unchanged = {
            let mut items = self.items.write();
            let unchanged = items
                .get(value.id())
                .is_some_and(|prior| prior.as_ref() == value.as_ref());
            items.insert(value.id().to_string(), Arc::clone(&value));
            unchanged
        };
        if !unchanged {
            let snapshot = serde_json::to_value(value.as_ref()).ok();
            self.recorder.record_upsert(T::KIND, value.id(), snapshot);
        }
        value
    }

    /// Remove by ID. Removing an absent entity records nothing.
    pub fn remove(&self, id: &str) -> Option<Arc<T>> {
        let removed = self.items.write().remove(id);
        if removed.is_some() {
            self.recorder.record_delete(T::KIND, id);
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<Arc<T>> {
        self.items.read().get(id).cloned()
    }

    /// Like `get`, but an absent entity is an error.
    pub fn require(&self, id: &str) -> Result<Arc<T>> {
        self.get(id)
            .ok_or_else(|| StoreError::not_found(T::NAME, id))
    }

    /// Point-in-time snapshot of every entity.
    pub fn items(&self) -> Vec<Arc<T>> {
        self.items.read().values().cloned().collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

/// The aggregate store: one typed map per entity kind plus the
/// secondary accessors the decision pipeline needs.
pub struct EntityStore {
    recorder: Arc<ChangeRecorder>,
    pub resources: TypedStore<Resource>,
    pub deployments: TypedStore<Deployment>,
    pub environments: TypedStore<Environment>,
    pub systems: TypedStore<System>,
    pub versions: TypedStore<DeploymentVersion>,
    pub deployment_variables: TypedStore<DeploymentVariable>,
    pub resource_variables: TypedStore<ResourceVariable>,
    pub policies: TypedStore<Policy>,
    pub skips: TypedStore<PolicySkip>,
    pub approvals: TypedStore<ApprovalRecord>,
    pub relationship_rules: TypedStore<RelationshipRule>,
}

impl EntityStore {
    pub fn new(recorder: Arc<ChangeRecorder>) -> Self {
        Self {
            resources: TypedStore::new(Arc::clone(&recorder)),
            deployments: TypedStore::new(Arc::clone(&recorder)),
            environments: TypedStore::new(Arc::clone(&recorder)),
            systems: TypedStore::new(Arc::clone(&recorder)),
            versions: TypedStore::new(Arc::clone(&recorder)),
            deployment_variables: TypedStore::new(Arc::clone(&recorder)),
            resource_variables: TypedStore::new(Arc::clone(&recorder)),
            policies: TypedStore::new(Arc::clone(&recorder)),
            skips: TypedStore::new(Arc::clone(&recorder)),
            approvals: TypedStore::new(Arc::clone(&recorder)),
            relationship_rules: TypedStore::new(Arc::clone(&recorder)),
            recorder,
        }
    }

    pub fn recorder(&self) -> &Arc<ChangeRecorder> {
        &self.recorder
    }

    // ── Secondary accessors ─────────────────────────────────────────

    pub fn versions_for_deployment(&self, deployment_id: &str) -> Vec<Arc<DeploymentVersion>> {
        self.versions
            .items()
            .into_iter()
            .filter(|v| v.deployment_id == deployment_id)
            .collect()
    }

    pub fn variables_for_deployment(&self, deployment_id: &str) -> Vec<Arc<DeploymentVariable>> {
        self.deployment_variables
            .items()
            .into_iter()
            .filter(|v| v.deployment_id == deployment_id)
            .collect()
    }

    pub fn resource_variable(&self, resource_id: &str, key: &str) -> Option<Arc<ResourceVariable>> {
        self.resource_variables
            .items()
            .into_iter()
            .find(|v| v.resource_id == resource_id && v.key == key)
    }

    pub fn skips_for(&self, rule_id: &str, version_id: &str) -> Vec<Arc<PolicySkip>> {
        self.skips
            .items()
            .into_iter()
            .filter(|s| s.rule_id == rule_id && s.version_id == version_id)
            .collect()
    }

    pub fn approvals_for(&self, rule_id: &str, version_id: &str) -> Vec<Arc<ApprovalRecord>> {
        self.approvals
            .items()
            .into_iter()
            .filter(|a| a.rule_id == rule_id && a.version_id == version_id)
            .collect()
    }

    pub fn environments_in_system(&self, system_id: &str) -> Vec<Arc<Environment>> {
        self.environments
            .items()
            .into_iter()
            .filter(|e| e.system_id == system_id)
            .collect()
    }

    pub fn deployments_in_system(&self, system_id: &str) -> Vec<Arc<Deployment>> {
        self.deployments
            .items()
            .into_iter()
            .filter(|d| d.system_id == system_id)
            .collect()
    }

    pub fn rule_by_reference(&self, reference: &str) -> Option<Arc<RelationshipRule>> {
        self.relationship_rules
            .items()
            .into_iter()
            .find(|r| r.reference == reference)
    }

    // ── Generic snapshots (for selectors and the relationship cache) ─

    /// Serialized snapshot of one entity of a relationship-capable
    /// type, or `None` when absent.
    pub fn snapshot(&self, entity_type: EntityType, id: &str) -> Option<serde_json::Value> {
        match entity_type {
            EntityType::Resource => self
                .resources
                .get(id)
                .and_then(|e| serde_json::to_value(e.as_ref()).ok()),
            EntityType::Deployment => self
                .deployments
                .get(id)
                .and_then(|e| serde_json::to_value(e.as_ref()).ok()),
            EntityType::Environment => self
                .environments
                .get(id)
                .and_then(|e| serde_json::to_value(e.as_ref()).ok()),
        }
    }

    /// Serialized snapshots of every entity of a type, as `(id, value)`.
    pub fn snapshots_of_type(&self, entity_type: EntityType) -> Vec<(String, serde_json::Value)> {
        fn collect<T: EntityRecord>(store: &TypedStore<T>) -> Vec<(String, serde_json::Value)> {
            store
                .items()
                .into_iter()
                .filter_map(|e| {
                    serde_json::to_value(e.as_ref())
                        .ok()
                        .map(|v| (e.id().to_string(), v))
                })
                .collect()
        }
        match entity_type {
            EntityType::Resource => collect(&self.resources),
            EntityType::Deployment => collect(&self.deployments),
            EntityType::Environment => collect(&self.environments),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_types::{ChangeKind, VersionStatus};
    use std::collections::BTreeMap;

    fn test_store() -> EntityStore {
        EntityStore::new(Arc::new(ChangeRecorder::default()))
    }

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

    #[test]
    fn test_upsert_replaces() {
        let store = test_store();
        store.resources.upsert(resource("res-1", "Node"));
        store.resources.upsert(resource("res-1", "Pod"));

        assert_eq!(store.resources.len(), 1);
        assert_eq!(store.resources.get("res-1").unwrap().kind, "Pod");
    }

    #[test]
    fn test_identical_upsert_records_once() {
        let store = test_store();
        store.resources.upsert(resource("res-1", "Node"));
        store.resources.upsert(resource("res-1", "Node"));

        let batch = store.recorder().commit();
        assert_eq!(batch.records.len(), 1);
    }

    #[test]
    fn test_remove_absent_records_nothing() {
        let store = test_store();
        assert!(store.resources.remove("ghost").is_none());
        let batch = store.recorder().commit();
        assert!(batch.records.is_empty());
    }

    #[test]
    fn test_changes_recorded_in_mutation_order() {
        let store = test_store();
        store.resources.upsert(resource("res-1", "Node"));
        store.resources.upsert(resource("res-2", "Node"));
        store.resources.remove("res-1");

        let batch = store.recorder().commit();
        assert_eq!(batch.records.len(), 3);
        assert_eq!(batch.records[0].kind, ChangeKind::Upsert);
        assert_eq!(batch.records[0].id, "res-1");
        assert!(batch.records[0].snapshot.is_some());
        assert_eq!(batch.records[2].kind, ChangeKind::Delete);
        assert!(batch.records[2].snapshot.is_none());
    }

    #[test]
    fn test_require() {
        let store = test_store();
        let err = store.resources.require("ghost").unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        store.resources.upsert(resource("res-1", "Node"));
        assert!(store.resources.require("res-1").is_ok());
    }

    #[test]
    fn test_versions_for_deployment() {
        let store = test_store();
        for (id, dep) in [("v-1", "dep-1"), ("v-2", "dep-1"), ("v-3", "dep-2")] {
            store.versions.upsert(DeploymentVersion {
                id: id.into(),
                deployment_id: dep.into(),
                tag: id.into(),
                status: VersionStatus::Ready,
                created_at: chrono::Utc::now(),
                metadata: BTreeMap::new(),
            });
        }
        assert_eq!(store.versions_for_deployment("dep-1").len(), 2);
        assert_eq!(store.versions_for_deployment("dep-2").len(), 1);
        assert!(store.versions_for_deployment("dep-3").is_empty());
    }

    #[test]
    fn test_snapshot_by_type() {
        let store = test_store();
        store.resources.upsert(resource("res-1", "Node"));
        let snap = store.snapshot(EntityType::Resource, "res-1").unwrap();
        assert_eq!(snap["kind"], "Node");
        assert!(store.snapshot(EntityType::Deployment, "res-1").is_none());

        let all = store.snapshots_of_type(EntityType::Resource);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].0, "res-1");
    }
}
