//! Engine-level errors: synchronous validation of the inbound API.

use thiserror::Error;

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// An entity failed inbound validation (empty or malformed ID,
    /// missing required reference).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The reconciler for this engine was already taken.
    #[error("Reconciler already constructed for this engine")]
    ReconcilerTaken,
}
