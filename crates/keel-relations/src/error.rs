//! Relationship engine errors.

use keel_types::EntityType;
use thiserror::Error;

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, RelationError>;

#[derive(Debug, Error)]
pub enum RelationError {
    /// The entity a computation was requested for does not exist.
    /// Reported to the caller but never fatal: the work item that
    /// asked simply returns without follow-ups.
    #[error("Entity not found: {entity_type} {id}")]
    EntityNotFound { entity_type: EntityType, id: String },
}
