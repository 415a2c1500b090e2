//! The engine facade: wiring, inbound API, and outbound queries.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

use keel_config::EngineConfig;
use keel_expr::{CacheStats, SelectorCache};
use keel_reconcile::{
    QueueStats, Reconciler, SelectorScope, Verification, VerificationStatus, VerificationStore,
    WorkItem, WorkQueue, WorkReceiver,
};
use keel_relations::{RelationStats, RelationshipCache};
use keel_release::ReleaseDecider;
use keel_store::EntityStore;
use keel_targets::TargetMaterializer;
use keel_types::{
    ApprovalRecord, ChangeBatch, Deployment, DeploymentVariable, DeploymentVersion, DesiredRelease,
    Environment, Policy, PolicySkip, RelationshipRule, ReleaseTargetKey, Resource,
    ResourceVariable, System,
};

use crate::error::{EngineError, Result};
use crate::handler::EngineHandler;

/// Point-in-time engine statistics.
#[derive(Debug, Clone, Copy)]
pub struct EngineStats {
    pub resources: usize,
    pub deployments: usize,
    pub environments: usize,
    pub release_targets: usize,
    pub desired_releases: usize,
    pub queue: QueueStats,
    pub relations: RelationStats,
    pub selectors: CacheStats,
}

/// The orchestration engine: one value owning every sub-store, passed
/// explicitly wherever state is needed.
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) store: Arc<EntityStore>,
    pub(crate) selectors: Arc<SelectorCache>,
    pub(crate) relations: Arc<RelationshipCache>,
    pub(crate) targets: Arc<TargetMaterializer>,
    pub(crate) verifications: Arc<VerificationStore>,
    pub(crate) decider: Arc<ReleaseDecider>,
    pub(crate) desired: Arc<RwLock<BTreeMap<ReleaseTargetKey, DesiredRelease>>>,
    pub(crate) queue: WorkQueue,
    pub(crate) receiver: Option<WorkReceiver>,
}

impl Engine {
    /// Build with defaults. Use [`crate::EngineBuilder`] to attach
    /// verification providers or tune the config.
    pub fn new(config: EngineConfig) -> Self {
        crate::builder::EngineBuilder::new().with_config(config).build()
    }

    /// Construct the reconciler draining this engine's queue. Can be
    /// taken once; the engine keeps its enqueue handle.
    pub fn reconciler(&mut self) -> Result<Reconciler<EngineHandler>> {
        let receiver = self.receiver.take().ok_or(EngineError::ReconcilerTaken)?;
        let handler = EngineHandler {
            store: Arc::clone(&self.store),
            relations: Arc::clone(&self.relations),
            targets: Arc::clone(&self.targets),
            verifications: Arc::clone(&self.verifications),
            decider: Arc::clone(&self.decider),
            desired: Arc::clone(&self.desired),
            queue: self.queue.clone(),
        };
        Ok(Reconciler::new(handler, self.queue.clone(), receiver))
    }

    // ── Inbound API: entities ───────────────────────────────────────
    //
    // Every mutator validates synchronously, replaces store state,
    // fans invalidation out to the caches, enqueues the reconciliation
    // work the change implies, and commits the change batch.

    pub fn upsert_resource(&self, resource: Resource) -> Result<()> {
        validate_id(&resource.id)?;
        let id = resource.id.clone();
        self.store.resources.upsert(resource);
        self.relations.invalidate_entity(&id);
        self.queue
            .enqueue(WorkItem::SelectorEval(SelectorScope::Resource(id)));
        self.store.recorder().commit();
        Ok(())
    }

    pub fn delete_resource(&self, id: &str) -> Result<()> {
        validate_id(id)?;
        self.store.resources.remove(id);
        self.relations.invalidate_entity(id);
        self.queue
            .enqueue(WorkItem::SelectorEval(SelectorScope::Resource(id.to_string())));
        self.store.recorder().commit();
        Ok(())
    }

    pub fn upsert_environment(&self, environment: Environment) -> Result<()> {
        validate_id(&environment.id)?;
        let id = environment.id.clone();
        self.store.environments.upsert(environment);
        self.relations.invalidate_entity(&id);
        self.queue
            .enqueue(WorkItem::SelectorEval(SelectorScope::Environment(id)));
        self.store.recorder().commit();
        Ok(())
    }

    pub fn delete_environment(&self, id: &str) -> Result<()> {
        validate_id(id)?;
        self.store.environments.remove(id);
        self.relations.invalidate_entity(id);
        self.queue.enqueue(WorkItem::SelectorEval(SelectorScope::Environment(
            id.to_string(),
        )));
        self.store.recorder().commit();
        Ok(())
    }

    pub fn upsert_deployment(&self, deployment: Deployment) -> Result<()> {
        validate_id(&deployment.id)?;
        let id = deployment.id.clone();
        self.store.deployments.upsert(deployment);
        self.relations.invalidate_entity(&id);
        self.queue
            .enqueue(WorkItem::SelectorEval(SelectorScope::Deployment(id)));
        self.store.recorder().commit();
        Ok(())
    }

    pub fn delete_deployment(&self, id: &str) -> Result<()> {
        validate_id(id)?;
        self.store.deployments.remove(id);
        self.relations.invalidate_entity(id);
        self.queue.enqueue(WorkItem::SelectorEval(SelectorScope::Deployment(
            id.to_string(),
        )));
        self.store.recorder().commit();
        Ok(())
    }

    pub fn upsert_system(&self, system: System) -> Result<()> {
        validate_id(&system.id)?;
        let id = system.id.clone();
        self.store.systems.upsert(system);
        self.requeue_system_environments(&id);
        self.store.recorder().commit();
        Ok(())
    }

    pub fn delete_system(&self, id: &str) -> Result<()> {
        validate_id(id)?;
        self.store.systems.remove(id);
        self.requeue_system_environments(id);
        self.store.recorder().commit();
        Ok(())
    }

    /// A system change can flip the join for every environment it
    /// groups.
    fn requeue_system_environments(&self, system_id: &str) {
        for env in self.store.environments_in_system(system_id) {
            self.queue.enqueue(WorkItem::SelectorEval(SelectorScope::Environment(
                env.id.clone(),
            )));
        }
    }

    // ── Inbound API: versions, variables ────────────────────────────

    pub fn upsert_version(&self, version: DeploymentVersion) -> Result<()> {
        validate_id(&version.id)?;
        validate_id(&version.deployment_id)?;
        let deployment_id = version.deployment_id.clone();
        self.store.versions.upsert(version);
        self.requeue_deployment_targets(&deployment_id);
        self.store.recorder().commit();
        Ok(())
    }

    pub fn delete_version(&self, id: &str) -> Result<()> {
        validate_id(id)?;
        if let Some(version) = self.store.versions.remove(id) {
            self.requeue_deployment_targets(&version.deployment_id);
        }
        self.store.recorder().commit();
        Ok(())
    }

    pub fn upsert_deployment_variable(&self, variable: DeploymentVariable) -> Result<()> {
        validate_id(&variable.id)?;
        validate_id(&variable.deployment_id)?;
        let deployment_id = variable.deployment_id.clone();
        self.store.deployment_variables.upsert(variable);
        self.requeue_deployment_targets(&deployment_id);
        self.store.recorder().commit();
        Ok(())
    }

    pub fn delete_deployment_variable(&self, id: &str) -> Result<()> {
        validate_id(id)?;
        if let Some(variable) = self.store.deployment_variables.remove(id) {
            self.requeue_deployment_targets(&variable.deployment_id);
        }
        self.store.recorder().commit();
        Ok(())
    }

    pub fn upsert_resource_variable(&self, variable: ResourceVariable) -> Result<()> {
        validate_id(&variable.id)?;
        validate_id(&variable.resource_id)?;
        let resource_id = variable.resource_id.clone();
        self.store.resource_variables.upsert(variable);
        self.requeue_resource_targets(&resource_id);
        self.store.recorder().commit();
        Ok(())
    }

    pub fn delete_resource_variable(&self, id: &str) -> Result<()> {
        validate_id(id)?;
        if let Some(variable) = self.store.resource_variables.remove(id) {
            self.requeue_resource_targets(&variable.resource_id);
        }
        self.store.recorder().commit();
        Ok(())
    }

    // ── Inbound API: policies, skips, approvals ─────────────────────

    pub fn upsert_policy(&self, policy: Policy) -> Result<()> {
        validate_id(&policy.id)?;
        self.store.policies.upsert(policy);
        self.requeue_all_targets();
        self.store.recorder().commit();
        Ok(())
    }

    pub fn delete_policy(&self, id: &str) -> Result<()> {
        validate_id(id)?;
        if self.store.policies.remove(id).is_some() {
            self.requeue_all_targets();
        }
        self.store.recorder().commit();
        Ok(())
    }

    pub fn upsert_policy_skip(&self, skip: PolicySkip) -> Result<()> {
        validate_id(&skip.id)?;
        let version_id = skip.version_id.clone();
        self.store.skips.upsert(skip);
        self.requeue_version_targets(&version_id);
        self.store.recorder().commit();
        Ok(())
    }

    pub fn delete_policy_skip(&self, id: &str) -> Result<()> {
        validate_id(id)?;
        if let Some(skip) = self.store.skips.remove(id) {
            self.requeue_version_targets(&skip.version_id);
        }
        self.store.recorder().commit();
        Ok(())
    }

    pub fn upsert_approval(&self, approval: ApprovalRecord) -> Result<()> {
        validate_id(&approval.id)?;
        let version_id = approval.version_id.clone();
        self.store.approvals.upsert(approval);
        self.requeue_version_targets(&version_id);
        self.store.recorder().commit();
        Ok(())
    }

    pub fn delete_approval(&self, id: &str) -> Result<()> {
        validate_id(id)?;
        if let Some(approval) = self.store.approvals.remove(id) {
            self.requeue_version_targets(&approval.version_id);
        }
        self.store.recorder().commit();
        Ok(())
    }

    // ── Inbound API: relationship rules ─────────────────────────────

    pub fn upsert_relationship_rule(&self, rule: RelationshipRule) -> Result<()> {
        validate_id(&rule.id)?;
        validate_id(&rule.reference)?;
        let previous = self.store.relationship_rules.get(&rule.id);
        let reference = rule.reference.clone();
        self.store.relationship_rules.upsert(rule);

        // A renamed reference invalidates relations cached under both
        // the old and the new key.
        if let Some(previous) = previous {
            if previous.reference != reference {
                self.relations.invalidate_rule(&previous.reference);
            }
        }
        self.relations.invalidate_rule(&reference);
        self.requeue_all_targets();
        self.store.recorder().commit();
        Ok(())
    }

    pub fn delete_relationship_rule(&self, id: &str) -> Result<()> {
        validate_id(id)?;
        if let Some(rule) = self.store.relationship_rules.remove(id) {
            self.relations.invalidate_rule(&rule.reference);
            self.requeue_all_targets();
        }
        self.store.recorder().commit();
        Ok(())
    }

    // ── Inbound API: verifications and raw work ─────────────────────

    /// Register a verification and start ticking its metrics.
    pub fn register_verification(&self, verification: Verification) -> Result<()> {
        validate_id(&verification.id)?;
        let id = verification.id.clone();
        let metric_count = verification.metrics.len();
        self.verifications.register(verification);
        for metric_index in 0..metric_count {
            self.queue.enqueue(WorkItem::VerificationTick {
                verification_id: id.clone(),
                metric_index,
            });
        }
        Ok(())
    }

    pub fn remove_verification(&self, verification_id: &str) {
        self.verifications.remove(verification_id);
    }

    pub fn verification_status(&self, verification_id: &str) -> Option<VerificationStatus> {
        self.verifications.status(verification_id)
    }

    /// Enqueue a raw work item.
    pub fn enqueue(&self, item: WorkItem) {
        self.queue.enqueue(item);
    }

    // ── Fan-out helpers ─────────────────────────────────────────────

    fn requeue_deployment_targets(&self, deployment_id: &str) {
        for key in self.targets.all() {
            if key.deployment_id == deployment_id {
                self.queue.enqueue(WorkItem::DesiredRelease(key));
            }
        }
    }

    fn requeue_resource_targets(&self, resource_id: &str) {
        for key in self.targets.all() {
            if key.resource_id == resource_id {
                self.queue.enqueue(WorkItem::DesiredRelease(key));
            }
        }
    }

    fn requeue_version_targets(&self, version_id: &str) {
        if let Some(version) = self.store.versions.get(version_id) {
            self.requeue_deployment_targets(&version.deployment_id);
        }
    }

    fn requeue_all_targets(&self) {
        for key in self.targets.all() {
            self.queue.enqueue(WorkItem::DesiredRelease(key));
        }
    }

    // ── Outbound API ────────────────────────────────────────────────

    pub fn desired_release(&self, key: &ReleaseTargetKey) -> Option<DesiredRelease> {
        self.desired.read().get(key).cloned()
    }

    pub fn desired_releases(&self) -> BTreeMap<ReleaseTargetKey, DesiredRelease> {
        self.desired.read().clone()
    }

    pub fn release_targets(&self) -> std::collections::BTreeSet<ReleaseTargetKey> {
        self.targets.all()
    }

    /// Subscribe to committed change batches.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<ChangeBatch> {
        self.store.recorder().subscribe()
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    pub fn relations(&self) -> &Arc<RelationshipCache> {
        &self.relations
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> EngineStats {
        let stats = EngineStats {
            resources: self.store.resources.len(),
            deployments: self.store.deployments.len(),
            environments: self.store.environments.len(),
            release_targets: self.targets.len(),
            desired_releases: self.desired.read().len(),
            queue: self.queue.stats(),
            relations: self.relations.stats(),
            selectors: self.selectors.stats(),
        };
        debug!(?stats, "Engine stats");
        stats
    }
}

fn validate_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(EngineError::InvalidInput("empty id".into()));
    }
    Ok(())
}
