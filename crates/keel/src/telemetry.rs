//! Tracing bootstrap for embedders.
//!
//! The engine only emits `tracing` events; installing a subscriber is
//! the embedder's choice. This helper wires the common case: fmt
//! output filtered by `RUST_LOG`, defaulting to `info`.

use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber. Safe to call more than once; only
/// the first call wins.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
