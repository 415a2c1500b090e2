//! Deployment and resource variables.
//!
//! A deployment variable carries an optional default plus an ordered
//! list of selector-scoped values; a resource variable pins a value
//! directly to one resource and overrides everything else. Values are
//! either literal scalars or references resolved through the
//! relationship engine.

use serde::{Deserialize, Serialize};

use crate::selector::Selector;

/// Where a variable value comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableSource {
    /// A literal scalar (string/int/bool/number/object).
    Literal(serde_json::Value),
    /// A reference into a related entity: follow the relationship rule
    /// with `reference`, then traverse `path` on the related entity's
    /// snapshot.
    Reference { reference: String, path: Vec<String> },
}

/// One selector-scoped candidate value of a deployment variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableValue {
    pub id: String,
    pub value: VariableSource,
    /// Higher integer beats lower among matching values.
    pub priority: i64,
    /// Scope: `None` applies to every resource, otherwise only to
    /// resources the selector matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_selector: Option<Selector>,
}

/// A variable attached to a deployment, keyed `(deployment_id, key)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentVariable {
    pub id: String,
    pub deployment_id: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
    #[serde(default)]
    pub values: Vec<VariableValue>,
}

/// A variable pinned to a single resource, keyed `(resource_id, key)`.
/// Unconditionally overrides deployment-variable candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceVariable {
    pub id: String,
    pub resource_id: String,
    pub key: String,
    pub value: VariableSource,
}
