//! Configuration system for the Keel engine.
//!
//! TOML-based tuning knobs with file layering: a user-level config in
//! the platform config directory, overridden by a project-local
//! `keel.toml`, overridden by an explicit `KEEL_CONFIG` path. All
//! fields default sensibly, so running with no config file at all is
//! the common case.

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{load_config, load_config_from, user_config_path};
pub use error::{ConfigError, Result};
pub use types::{ChangeStreamConfig, EngineConfig, QueueConfig, VerificationConfig};
