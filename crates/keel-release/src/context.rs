//! Evaluation context for one release target.

use std::sync::Arc;

use keel_expr::Context;
use keel_store::EntityStore;
use keel_types::{DeploymentVersion, ReleaseTargetKey};

use crate::error::Result;

/// Snapshots of a release target's three endpoints, loaded once per
/// evaluation so every policy and selector sees the same state.
#[derive(Debug, Clone)]
pub struct TargetContext {
    pub key: ReleaseTargetKey,
    pub environment: serde_json::Value,
    pub deployment: serde_json::Value,
    pub resource: serde_json::Value,
}

impl TargetContext {
    /// Load the endpoint snapshots from the store. Any missing
    /// endpoint is a `NotFound`: the target is stale and the caller
    /// returns cleanly.
    pub fn load(store: &Arc<EntityStore>, key: &ReleaseTargetKey) -> Result<Self> {
        let environment = store.environments.require(&key.environment_id)?;
        let deployment = store.deployments.require(&key.deployment_id)?;
        let resource = store.resources.require(&key.resource_id)?;
        Ok(Self {
            key: key.clone(),
            environment: serde_json::to_value(environment.as_ref()).unwrap_or_default(),
            deployment: serde_json::to_value(deployment.as_ref()).unwrap_or_default(),
            resource: serde_json::to_value(resource.as_ref()).unwrap_or_default(),
        })
    }

    /// The expression context for policy-scoped evaluation. JSON
    /// selectors in policy position read the resource, so it doubles
    /// as the `entity` binding.
    pub fn expr_context(&self, version: Option<&DeploymentVersion>) -> Context {
        let mut ctx = Context::new()
            .bind("environment", self.environment.clone())
            .bind("deployment", self.deployment.clone())
            .bind("resource", self.resource.clone())
            .bind("entity", self.resource.clone());
        if let Some(version) = version {
            ctx = ctx.bind(
                "version",
                serde_json::to_value(version).unwrap_or_default(),
            );
        }
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_store::ChangeRecorder;
    use keel_types::{Deployment, Environment, Resource};
    use std::collections::BTreeMap;

    fn seeded_store() -> Arc<EntityStore> {
        let store = Arc::new(EntityStore::new(Arc::new(ChangeRecorder::default())));
        store.environments.upsert(Environment {
            id: "env-1".into(),
            name: "production".into(),
            system_id: "sys-1".into(),
            resource_selector: None,
        });
        store.deployments.upsert(Deployment {
            id: "dep-1".into(),
            name: "web".into(),
            slug: "web".into(),
            system_id: "sys-1".into(),
            resource_selector: None,
            job_agent_config: serde_json::Value::Null,
        });
        store.resources.upsert(Resource {
            id: "res-1".into(),
            name: "node-1".into(),
            kind: "Node".into(),
            identifier: "test/node-1".into(),
            workspace_id: "ws-1".into(),
            metadata: BTreeMap::new(),
            config: serde_json::Value::Null,
            provider_id: None,
        });
        store
    }

    #[test]
    fn test_load_and_bindings() {
        let store = seeded_store();
        let key = ReleaseTargetKey::new("env-1", "dep-1", "res-1");
        let ctx = TargetContext::load(&store, &key).unwrap();
        assert_eq!(ctx.environment["name"], "production");
        assert_eq!(ctx.deployment["slug"], "web");
        assert_eq!(ctx.resource["kind"], "Node");

        let expr_ctx = ctx.expr_context(None);
        let path: Vec<String> = vec!["environment".into(), "name".into()];
        assert_eq!(expr_ctx.resolve(&path), Some(&serde_json::json!("production")));
    }

    #[test]
    fn test_load_missing_endpoint() {
        let store = seeded_store();
        let key = ReleaseTargetKey::new("env-1", "dep-1", "ghost");
        assert!(TargetContext::load(&store, &key).is_err());
    }
}
