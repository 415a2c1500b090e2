//! Release pipeline errors.

use thiserror::Error;

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, ReleaseError>;

#[derive(Debug, Error)]
pub enum ReleaseError {
    /// One endpoint of the release target no longer exists. The work
    /// item that asked logs it and returns without follow-ups.
    #[error(transparent)]
    NotFound(#[from] keel_store::StoreError),
}
