//! Release targets and desired releases: the core's derived outputs.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The `(environment, deployment, resource)` triple a version may be
/// selected for. Exists exactly while the materializer join holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReleaseTargetKey {
    pub environment_id: String,
    pub deployment_id: String,
    pub resource_id: String,
}

impl ReleaseTargetKey {
    pub fn new(
        environment_id: impl Into<String>,
        deployment_id: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            environment_id: environment_id.into(),
            deployment_id: deployment_id.into(),
            resource_id: resource_id.into(),
        }
    }
}

impl fmt::Display for ReleaseTargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.environment_id, self.deployment_id, self.resource_id
        )
    }
}

/// The version slice carried by a desired release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseVersion {
    pub id: String,
    pub tag: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// The core's output for one release target: which version should run
/// there, with fully resolved variables. Overwritten on every
/// re-evaluation; deliberately carries no timestamp so identical
/// decisions compare equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredRelease {
    pub key: ReleaseTargetKey,
    pub version: ReleaseVersion,
    /// One entry per deployment-variable key that resolved; keys that
    /// did not resolve are absent.
    #[serde(default)]
    pub variables: BTreeMap<String, serde_json::Value>,
}
