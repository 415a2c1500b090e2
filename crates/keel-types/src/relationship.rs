//! Relationship rules and the relations they produce.
//!
//! A relationship rule links entities of `from_type` to entities of
//! `to_type`: both endpoints are narrowed by optional selectors, then
//! the matcher decides whether a concrete pair is related. The rule's
//! `reference` is a stable, user-chosen key that survives rule edits
//! and is what variable references name.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::EntityType;
use crate::selector::Selector;

/// Comparison operators available to the property-matcher form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchOperator {
    Equals,
    Contains,
    StartsWith,
}

/// How two candidate entities are matched against each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipMatcher {
    /// An expression with the candidates bound as `from` and `to`.
    Expr(String),
    /// Property form: `from.<from_property> <operator> to.<to_property>`.
    Properties {
        from_property: Vec<String>,
        to_property: Vec<String>,
        operator: MatchOperator,
    },
}

/// A typed relationship rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRule {
    pub id: String,
    /// Stable key; relations are grouped under it in the cache and
    /// variable references resolve through it.
    pub reference: String,
    pub from_type: EntityType,
    pub to_type: EntityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_selector: Option<Selector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_selector: Option<Selector>,
    pub matcher: RelationshipMatcher,
}

/// Which side of the rule the *related* entity sits on, seen from the
/// entity the cache entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationDirection {
    /// The related entity is on the rule's `to` side.
    To,
    /// The related entity is on the rule's `from` side.
    From,
}

impl fmt::Display for RelationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::To => f.write_str("to"),
            Self::From => f.write_str("from"),
        }
    }
}

/// One edge of the relationship multigraph, cached with a snapshot of
/// the related entity taken at computation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRelation {
    pub rule_id: String,
    pub reference: String,
    pub direction: RelationDirection,
    pub entity_type: EntityType,
    pub entity_id: String,
    /// Serialized snapshot of the related entity.
    pub entity: serde_json::Value,
}
