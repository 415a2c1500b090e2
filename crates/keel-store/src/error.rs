//! Store errors.

use thiserror::Error;

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// An entity was required but is not present.
    #[error("Not found: {entity_type} {id}")]
    NotFound { entity_type: &'static str, id: String },
}

impl StoreError {
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }
}
