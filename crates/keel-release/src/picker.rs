//! Version picker: newest eligible version accepted by policy.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::trace;

use keel_store::EntityStore;
use keel_types::DeploymentVersion;

use crate::context::TargetContext;
use crate::policy::PolicyEvaluator;

/// Pick the release candidate for a target: versions ordered by
/// `(created_at desc, id desc)`, ready ones only, first one the
/// policy evaluator accepts. `None` when nothing is eligible.
pub fn pick_version(
    store: &Arc<EntityStore>,
    evaluator: &PolicyEvaluator,
    ctx: &TargetContext,
    now: DateTime<Utc>,
) -> Option<Arc<DeploymentVersion>> {
    let mut candidates: Vec<Arc<DeploymentVersion>> = store
        .versions_for_deployment(&ctx.key.deployment_id)
        .into_iter()
        .filter(|v| v.is_deployable())
        .collect();
    candidates.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });

    for candidate in candidates {
        let decision = evaluator.evaluate(ctx, &candidate, now);
        if decision.is_accept() {
            return Some(candidate);
        }
        trace!(
            target = %ctx.key,
            version = %candidate.tag,
            "Candidate rejected; trying older version"
        );
    }
    None
}
