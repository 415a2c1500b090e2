//! Core entities as delivered by the ingestion layer.
//!
//! Entities are owned by the entity store; everything else works on
//! `Arc` clones or serialized snapshots. IDs are externally assigned
//! strings, globally unique and stable for the entity's lifetime.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::selector::Selector;

/// The entity types relationship rules can range over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Resource,
    Deployment,
    Environment,
}

impl EntityType {
    /// The context binding name used when a selector is evaluated
    /// against an entity of this type.
    pub fn binding(&self) -> &'static str {
        match self {
            Self::Resource => "resource",
            Self::Deployment => "deployment",
            Self::Environment => "environment",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binding())
    }
}

/// A deployable target: a cluster, a VM, a namespace, anything a
/// provider has registered into the workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub identifier: String,
    pub workspace_id: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
}

/// A deployable unit within a system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub system_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_selector: Option<Selector>,
    #[serde(default)]
    pub job_agent_config: serde_json::Value,
}

/// A stage (dev, staging, production, ...) within a system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    pub id: String,
    pub name: String,
    pub system_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_selector: Option<Selector>,
}

/// Groups deployments and environments. Release targets only form
/// between an environment and a deployment of the same system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct System {
    pub id: String,
    pub name: String,
    pub workspace_id: String,
}

/// Lifecycle status of a deployment version. Only `Ready` versions
/// are candidates for release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    Ready,
    Building,
    Failed,
    Rejected,
}

/// A concrete, tagged build of a deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentVersion {
    pub id: String,
    pub deployment_id: String,
    pub tag: String,
    pub status: VersionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl DeploymentVersion {
    /// Whether this version may be considered by the version picker.
    pub fn is_deployable(&self) -> bool {
        self.status == VersionStatus::Ready
    }
}
