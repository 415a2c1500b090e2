//! Release decision pipeline.
//!
//! For one release target: order the deployment's ready versions
//! newest-first, walk them through the policy evaluator (rules,
//! skips, approval records), stop at the first accepted candidate,
//! resolve that candidate's variables, and emit a desired release.
//! Everything here is pure given the store, the relationship cache,
//! and the injected clock.

pub mod context;
pub mod decider;
pub mod error;
pub mod picker;
pub mod policy;
pub mod variables;

pub use context::TargetContext;
pub use decider::ReleaseDecider;
pub use error::{ReleaseError, Result};
pub use picker::pick_version;
pub use policy::{Decision, PolicyEvaluator, RejectReason};
pub use variables::VariableResolver;
