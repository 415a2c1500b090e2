//! Change records emitted toward external persistence sinks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether the entity was written or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Upsert,
    Delete,
}

/// Every entity kind the store records changes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangedEntity {
    Resource,
    Deployment,
    Environment,
    System,
    DeploymentVersion,
    DeploymentVariable,
    ResourceVariable,
    Policy,
    PolicySkip,
    ApprovalRecord,
    RelationshipRule,
    /// Derived output, recorded when a desired release appears,
    /// changes, or disappears; its `id` is the release-target key.
    DesiredRelease,
}

/// One mutation, in mutation order within its batch. Upserts carry the
/// post-state snapshot; deletes carry none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub kind: ChangeKind,
    pub entity_type: ChangedEntity,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<serde_json::Value>,
}

/// A committed batch of change records. Batches are delimited by
/// reconciliation commit; ordering inside a batch mirrors mutation
/// order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeBatch {
    pub records: Vec<ChangeRecord>,
    pub committed_at: DateTime<Utc>,
}
