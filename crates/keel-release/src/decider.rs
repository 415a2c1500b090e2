//! The full decision pipeline for one release target.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use keel_expr::SelectorCache;
use keel_relations::RelationshipCache;
use keel_store::EntityStore;
use keel_types::{DesiredRelease, ReleaseTargetKey, ReleaseVersion};

use crate::context::TargetContext;
use crate::error::Result;
use crate::picker::pick_version;
use crate::policy::PolicyEvaluator;
use crate::variables::VariableResolver;

/// Runs version picking, policy evaluation, and variable resolution
/// for release targets.
pub struct ReleaseDecider {
    store: Arc<EntityStore>,
    evaluator: PolicyEvaluator,
    resolver: VariableResolver,
}

impl ReleaseDecider {
    pub fn new(
        store: Arc<EntityStore>,
        selectors: Arc<SelectorCache>,
        relations: Arc<RelationshipCache>,
    ) -> Self {
        let evaluator = PolicyEvaluator::new(Arc::clone(&store), Arc::clone(&selectors));
        let resolver = VariableResolver::new(Arc::clone(&store), selectors, relations);
        Self {
            store,
            evaluator,
            resolver,
        }
    }

    /// Decide the desired release for one target. `Ok(None)` means no
    /// eligible version exists; a missing endpoint is an error the
    /// caller logs and drops.
    pub fn decide(
        &self,
        key: &ReleaseTargetKey,
        now: DateTime<Utc>,
    ) -> Result<Option<DesiredRelease>> {
        let ctx = TargetContext::load(&self.store, key)?;

        let Some(version) = pick_version(&self.store, &self.evaluator, &ctx, now) else {
            debug!(target = %key, "No eligible version");
            return Ok(None);
        };

        let variables = self.resolver.resolve(&ctx);
        debug!(target = %key, version = %version.tag, variables = variables.len(), "Desired release decided");

        Ok(Some(DesiredRelease {
            key: key.clone(),
            version: ReleaseVersion {
                id: version.id.clone(),
                tag: version.tag.clone(),
                metadata: version.metadata.clone(),
            },
            variables,
        }))
    }
}
