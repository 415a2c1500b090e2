//! Cooperative reconciliation for Keel.
//!
//! A reconciler is a single-threaded loop draining a FIFO queue of
//! typed work items. Items execute to completion without preemption;
//! the only suspension points are the boundaries between items and the
//! `RequeueAfter` delay an item may return. Multiple reconcilers can
//! coexist, sharing nothing but the stores; causality is established
//! by explicit enqueue, and handlers treat their inputs as possibly
//! stale, reconfirming against the authoritative store.

pub mod error;
pub mod item;
pub mod provider;
pub mod queue;
pub mod reconciler;
pub mod verify;

pub use error::{ReconcileError, Result};
pub use item::{Outcome, SelectorScope, WorkItem};
pub use provider::{MetricProvider, StaticProvider};
pub use queue::{QueueConfig, QueueStats, WorkQueue, WorkReceiver, work_queue};
pub use reconciler::{Reconciler, WorkHandler};
pub use verify::{
    Measurement, MetricSpec, MetricStatus, TickOutcome, Verification, VerificationStatus,
    VerificationStore,
};
