//! Shared types for the Keel deployment orchestration core.
//!
//! Everything here is plain data: entities as they arrive from the
//! ingestion layer, selectors in their two surface forms, policy and
//! variable definitions, and the derived records the core emits
//! (release targets, desired releases, change batches).

pub mod change;
pub mod entity;
pub mod policy;
pub mod relationship;
pub mod release;
pub mod selector;
pub mod variable;

pub use change::{ChangeBatch, ChangeKind, ChangeRecord, ChangedEntity};
pub use entity::{
    Deployment, DeploymentVersion, Environment, EntityType, Resource, System, VersionStatus,
};
pub use policy::{ApprovalRecord, DenyWindow, Policy, PolicyRule, PolicySkip, RuleKind};
pub use relationship::{
    EntityRelation, MatchOperator, RelationDirection, RelationshipMatcher, RelationshipRule,
};
pub use release::{DesiredRelease, ReleaseTargetKey, ReleaseVersion};
pub use selector::{JsonOperator, JsonSelector, Selector};
pub use variable::{DeploymentVariable, ResourceVariable, VariableSource, VariableValue};
