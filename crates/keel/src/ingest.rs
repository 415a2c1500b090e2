//! Dynamic inbound API for the ingestion layer.
//!
//! Event handlers and RPC endpoints deal in `(entity kind, payload)`
//! pairs; this module deserializes the payload and dispatches to the
//! engine's typed mutators. Errors are synchronous validation only;
//! a malformed payload never reaches the store.

use serde_json::Value;

use keel_types::{
    ApprovalRecord, ChangedEntity, Deployment, DeploymentVariable, DeploymentVersion, Environment,
    Policy, PolicySkip, RelationshipRule, Resource, ResourceVariable, System,
};

use crate::engine::Engine;
use crate::error::{EngineError, Result};

impl Engine {
    /// Upsert an entity from its serialized form.
    pub fn upsert(&self, kind: ChangedEntity, payload: Value) -> Result<()> {
        match kind {
            ChangedEntity::Resource => self.upsert_resource(decode::<Resource>(payload)?),
            ChangedEntity::Deployment => self.upsert_deployment(decode::<Deployment>(payload)?),
            ChangedEntity::Environment => self.upsert_environment(decode::<Environment>(payload)?),
            ChangedEntity::System => self.upsert_system(decode::<System>(payload)?),
            ChangedEntity::DeploymentVersion => {
                self.upsert_version(decode::<DeploymentVersion>(payload)?)
            }
            ChangedEntity::DeploymentVariable => {
                self.upsert_deployment_variable(decode::<DeploymentVariable>(payload)?)
            }
            ChangedEntity::ResourceVariable => {
                self.upsert_resource_variable(decode::<ResourceVariable>(payload)?)
            }
            ChangedEntity::Policy => self.upsert_policy(decode::<Policy>(payload)?),
            ChangedEntity::PolicySkip => self.upsert_policy_skip(decode::<PolicySkip>(payload)?),
            ChangedEntity::ApprovalRecord => {
                self.upsert_approval(decode::<ApprovalRecord>(payload)?)
            }
            ChangedEntity::RelationshipRule => {
                self.upsert_relationship_rule(decode::<RelationshipRule>(payload)?)
            }
            ChangedEntity::DesiredRelease => Err(EngineError::InvalidInput(
                "desired releases are derived, not ingested".into(),
            )),
        }
    }

    /// Delete an entity by kind and id.
    pub fn delete(&self, kind: ChangedEntity, id: &str) -> Result<()> {
        match kind {
            ChangedEntity::Resource => self.delete_resource(id),
            ChangedEntity::Deployment => self.delete_deployment(id),
            ChangedEntity::Environment => self.delete_environment(id),
            ChangedEntity::System => self.delete_system(id),
            ChangedEntity::DeploymentVersion => self.delete_version(id),
            ChangedEntity::DeploymentVariable => self.delete_deployment_variable(id),
            ChangedEntity::ResourceVariable => self.delete_resource_variable(id),
            ChangedEntity::Policy => self.delete_policy(id),
            ChangedEntity::PolicySkip => self.delete_policy_skip(id),
            ChangedEntity::ApprovalRecord => self.delete_approval(id),
            ChangedEntity::RelationshipRule => self.delete_relationship_rule(id),
            ChangedEntity::DesiredRelease => Err(EngineError::InvalidInput(
                "desired releases are derived, not deleted".into(),
            )),
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(payload: Value) -> Result<T> {
    serde_json::from_value(payload)
        .map_err(|err| EngineError::InvalidInput(format!("malformed entity: {err}")))
}
