//! Keel: a workspace deployment orchestration core.
//!
//! An in-memory, incrementally maintained model deciding, for every
//! `(environment, deployment, resource)` release target, which
//! deployment version should run there and with which resolved
//! variables. The [`Engine`] wires the entity store, the relationship
//! cache, the release-target materializer, and the decision pipeline
//! behind a cooperative reconciler; embedders feed it entity upserts
//! and deletes and consume desired releases plus a change record
//! stream.
//!
//! ```no_run
//! use keel::EngineBuilder;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let mut engine = EngineBuilder::new().build();
//! let reconciler = engine.reconciler()?;
//! let cancel = CancellationToken::new();
//! tokio::spawn(reconciler.run(cancel.clone()));
//! // engine.upsert_resource(...), engine.desired_releases(), ...
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod engine;
pub mod error;
pub mod handler;
pub mod ingest;
pub mod telemetry;

pub use builder::EngineBuilder;
pub use engine::{Engine, EngineStats};
pub use error::{EngineError, Result};
pub use handler::EngineHandler;

pub use keel_config::EngineConfig;
pub use keel_reconcile::{
    MetricProvider, MetricSpec, Outcome, SelectorScope, StaticProvider, Verification,
    VerificationStatus, WorkItem,
};
pub use keel_types as types;
