//! Reconciliation errors.

use thiserror::Error;

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, ReconcileError>;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Referenced state no longer exists; the work item returns
    /// cleanly without follow-ups.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A provider or I/O failure inside verification; converts to a
    /// requeue with backoff.
    #[error("Transient failure: {0}")]
    Transient(String),
}
