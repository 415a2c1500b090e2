//! Work items and handler outcomes.

use std::fmt;
use std::time::Duration;

use keel_types::{EntityType, ReleaseTargetKey};

/// Which entity's resource set a `SelectorEval` item recomputes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SelectorScope {
    Environment(String),
    Deployment(String),
    Resource(String),
}

impl fmt::Display for SelectorScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Environment(id) => write!(f, "environment/{id}"),
            Self::Deployment(id) => write!(f, "deployment/{id}"),
            Self::Resource(id) => write!(f, "resource/{id}"),
        }
    }
}

/// A typed, scoped unit of reconciliation work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WorkItem {
    /// Recompute an entity's resource set, diff against the prior
    /// release-target set, and fan out `DesiredRelease` items for
    /// every changed target.
    SelectorEval(SelectorScope),

    /// Re-run the decision pipeline for one release target and
    /// overwrite its desired release.
    DesiredRelease(ReleaseTargetKey),

    /// Advance one verification metric one step.
    VerificationTick {
        verification_id: String,
        metric_index: usize,
    },

    /// Force relation recomputation for one entity.
    RelationshipRecompute {
        entity_type: EntityType,
        entity_id: String,
    },
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SelectorEval(scope) => write!(f, "selector-eval {scope}"),
            Self::DesiredRelease(key) => write!(f, "desired-release {key}"),
            Self::VerificationTick {
                verification_id,
                metric_index,
            } => write!(f, "verification-tick {verification_id}[{metric_index}]"),
            Self::RelationshipRecompute { entity_id, .. } => {
                write!(f, "relationship-recompute {entity_id}")
            }
        }
    }
}

/// What a handler asks the reconciler to do next with the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The item is finished (possibly having enqueued descendants).
    Done,
    /// Re-enqueue the same item after the delay.
    RequeueAfter(Duration),
}
