//! Change recorder: batched mutation log for downstream sinks.
//!
//! Mutations append to an open batch in mutation order; `commit`
//! seals the batch and publishes it to subscribers. The channel is
//! bounded: a subscriber that lags far enough loses batches, which the
//! core accepts (persistence reconciles from the authoritative store).

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use keel_types::{ChangeBatch, ChangeKind, ChangeRecord, ChangedEntity};

/// Default subscriber channel capacity (batches, not records).
pub const DEFAULT_STREAM_BUFFER: usize = 256;

/// Recorder statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecorderStats {
    /// Records in the open, uncommitted batch.
    pub pending: usize,
    /// Batches committed since construction.
    pub committed_batches: u64,
}

struct RecorderInner {
    open: Vec<ChangeRecord>,
    committed_batches: u64,
}

/// Batch-scoped append-only change log.
pub struct ChangeRecorder {
    inner: Mutex<RecorderInner>,
    tx: broadcast::Sender<ChangeBatch>,
}

impl ChangeRecorder {
    pub fn new(stream_buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(stream_buffer.max(1));
        Self {
            inner: Mutex::new(RecorderInner {
                open: Vec::new(),
                committed_batches: 0,
            }),
            tx,
        }
    }

    /// Append an upsert record carrying the post-state snapshot.
    pub fn record_upsert(
        &self,
        entity_type: ChangedEntity,
        id: impl Into<String>,
        snapshot: Option<serde_json::Value>,
    ) {
        self.record(ChangeRecord {
            kind: ChangeKind::Upsert,
            entity_type,
            id: id.into(),
            snapshot,
        });
    }

    /// Append a delete record.
    pub fn record_delete(&self, entity_type: ChangedEntity, id: impl Into<String>) {
        self.record(ChangeRecord {
            kind: ChangeKind::Delete,
            entity_type,
            id: id.into(),
            snapshot: None,
        });
    }

    /// Append a raw record.
    pub fn record(&self, record: ChangeRecord) {
        self.inner.lock().open.push(record);
    }

    /// Seal the open batch, publish it, and return it.
    ///
    /// An empty batch is not published; callers may commit freely at
    /// reconciliation boundaries.
    pub fn commit(&self) -> ChangeBatch {
        let records = {
            let mut inner = self.inner.lock();
            if !inner.open.is_empty() {
                inner.committed_batches += 1;
            }
            std::mem::take(&mut inner.open)
        };
        let batch = ChangeBatch {
            records,
            committed_at: Utc::now(),
        };
        if !batch.records.is_empty() {
            debug!(records = batch.records.len(), "Committing change batch");
            // Send fails only when no subscriber exists, which is fine.
            let _ = self.tx.send(batch.clone());
        }
        batch
    }

    /// Subscribe to committed batches.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeBatch> {
        self.tx.subscribe()
    }

    pub fn stats(&self) -> RecorderStats {
        let inner = self.inner.lock();
        RecorderStats {
            pending: inner.open.len(),
            committed_batches: inner.committed_batches,
        }
    }
}

impl Default for ChangeRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_STREAM_BUFFER)
    }
}
