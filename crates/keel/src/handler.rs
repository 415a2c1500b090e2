//! Work item handlers: the engine side of the reconciler.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use keel_reconcile::{
    Outcome, SelectorScope, TickOutcome, VerificationStore, WorkHandler, WorkItem, WorkQueue,
};
use keel_relations::RelationshipCache;
use keel_release::ReleaseDecider;
use keel_store::EntityStore;
use keel_targets::{TargetDiff, TargetMaterializer};
use keel_types::{ChangedEntity, DesiredRelease, EntityType, ReleaseTargetKey};

/// Executes work items against the engine's shared state.
///
/// Every handler is idempotent: selector evaluation replaces a slice
/// of the target set wholesale, desired-release decisions overwrite
/// and only record a change when the output actually differs, and
/// verification ticks on terminal metrics are no-ops.
pub struct EngineHandler {
    pub(crate) store: Arc<EntityStore>,
    pub(crate) relations: Arc<RelationshipCache>,
    pub(crate) targets: Arc<TargetMaterializer>,
    pub(crate) verifications: Arc<VerificationStore>,
    pub(crate) decider: Arc<ReleaseDecider>,
    pub(crate) desired: Arc<RwLock<BTreeMap<ReleaseTargetKey, DesiredRelease>>>,
    pub(crate) queue: WorkQueue,
}

#[async_trait]
impl WorkHandler for EngineHandler {
    async fn handle(&self, item: WorkItem, cancel: &CancellationToken) -> Outcome {
        if cancel.is_cancelled() {
            return Outcome::Done;
        }
        match item {
            WorkItem::SelectorEval(scope) => self.handle_selector_eval(scope),
            WorkItem::DesiredRelease(key) => self.handle_desired_release(key),
            WorkItem::VerificationTick {
                verification_id,
                metric_index,
            } => self.handle_verification_tick(&verification_id, metric_index).await,
            WorkItem::RelationshipRecompute {
                entity_type,
                entity_id,
            } => self.handle_relationship_recompute(entity_type, &entity_id),
        }
    }
}

impl EngineHandler {
    /// Recompute the scoped slice of the release-target set and fan
    /// out desired-release work for everything the change touches:
    /// keys still in the slice (their inputs may have changed) and
    /// keys that dropped out (their desired releases must go).
    fn handle_selector_eval(&self, scope: SelectorScope) -> Outcome {
        let diff: TargetDiff = match &scope {
            SelectorScope::Environment(id) => self.targets.recompute_environment(id),
            SelectorScope::Deployment(id) => self.targets.recompute_deployment(id),
            SelectorScope::Resource(id) => self.targets.recompute_resource(id),
        };

        let current: Vec<ReleaseTargetKey> = self
            .targets
            .all()
            .into_iter()
            .filter(|key| match &scope {
                SelectorScope::Environment(id) => key.environment_id == *id,
                SelectorScope::Deployment(id) => key.deployment_id == *id,
                SelectorScope::Resource(id) => key.resource_id == *id,
            })
            .collect();

        debug!(
            scope = %scope,
            targets = current.len(),
            added = diff.added.len(),
            removed = diff.removed.len(),
            "Selector evaluation finished"
        );

        for key in current {
            self.queue.enqueue(WorkItem::DesiredRelease(key));
        }
        for key in diff.removed {
            self.queue.enqueue(WorkItem::DesiredRelease(key));
        }
        Outcome::Done
    }

    /// Re-run the decision pipeline for one target and overwrite its
    /// desired release. The target set is the authority: a key no
    /// longer in it loses its desired release regardless of why the
    /// item was enqueued.
    fn handle_desired_release(&self, key: ReleaseTargetKey) -> Outcome {
        if !self.targets.contains(&key) {
            self.drop_desired(&key);
            self.store.recorder().commit();
            return Outcome::Done;
        }

        match self.decider.decide(&key, Utc::now()) {
            Ok(Some(release)) => {
                let changed = {
                    let mut desired = self.desired.write();
                    match desired.get(&key) {
                        Some(prior) if *prior == release => false,
                        _ => {
                            desired.insert(key.clone(), release.clone());
                            true
                        }
                    }
                };
                if changed {
                    self.store.recorder().record_upsert(
                        ChangedEntity::DesiredRelease,
                        key.to_string(),
                        serde_json::to_value(&release).ok(),
                    );
                }
            }
            Ok(None) => self.drop_desired(&key),
            Err(err) => {
                // The target raced an entity delete; the next
                // selector-eval cleans the set up.
                debug!(target = %key, error = %err, "Desired release evaluation skipped");
            }
        }
        self.store.recorder().commit();
        Outcome::Done
    }

    fn drop_desired(&self, key: &ReleaseTargetKey) {
        let existed = self.desired.write().remove(key).is_some();
        if existed {
            self.store
                .recorder()
                .record_delete(ChangedEntity::DesiredRelease, key.to_string());
            debug!(target = %key, "Desired release dropped");
        }
    }

    async fn handle_verification_tick(
        &self,
        verification_id: &str,
        metric_index: usize,
    ) -> Outcome {
        match self
            .verifications
            .tick(verification_id, metric_index, Utc::now())
            .await
        {
            TickOutcome::Requeue(delay) => Outcome::RequeueAfter(delay),
            TickOutcome::Terminal { release_target, .. } => {
                self.queue.enqueue(WorkItem::DesiredRelease(release_target));
                Outcome::Done
            }
            TickOutcome::NotFound => Outcome::Done,
        }
    }

    fn handle_relationship_recompute(&self, entity_type: EntityType, entity_id: &str) -> Outcome {
        if let Err(err) = self.relations.compute_for_entity(entity_type, entity_id) {
            warn!(entity = %entity_id, error = %err, "Relation recomputation skipped");
        }
        Outcome::Done
    }
}
