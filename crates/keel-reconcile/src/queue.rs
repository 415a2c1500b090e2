//! The work queue: an unbounded FIFO channel with a soft cap that
//! sheds duplicate `selector-eval` items under pressure.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::item::{SelectorScope, WorkItem};

/// Queue tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Above this depth, duplicate selector-eval items are shed
    /// instead of enqueued.
    pub soft_cap: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { soft_cap: 4096 }
    }
}

impl QueueConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_soft_cap(mut self, soft_cap: usize) -> Self {
        self.soft_cap = soft_cap;
        self
    }
}

/// Queue statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub depth: usize,
    pub shed: u64,
}

struct QueueShared {
    depth: AtomicUsize,
    shed: AtomicU64,
    pending_selector_evals: Mutex<HashSet<SelectorScope>>,
    config: QueueConfig,
}

/// Cloneable enqueue handle.
#[derive(Clone)]
pub struct WorkQueue {
    tx: mpsc::UnboundedSender<WorkItem>,
    shared: Arc<QueueShared>,
}

/// The consuming side, owned by exactly one reconciler.
pub struct WorkReceiver {
    rx: mpsc::UnboundedReceiver<WorkItem>,
    shared: Arc<QueueShared>,
}

/// Create a connected queue handle and receiver.
pub fn work_queue(config: QueueConfig) -> (WorkQueue, WorkReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let shared = Arc::new(QueueShared {
        depth: AtomicUsize::new(0),
        shed: AtomicU64::new(0),
        pending_selector_evals: Mutex::new(HashSet::new()),
        config,
    });
    (
        WorkQueue {
            tx,
            shared: Arc::clone(&shared),
        },
        WorkReceiver { rx, shared },
    )
}

impl WorkQueue {
    /// Enqueue an item. Returns `false` when the item was shed (a
    /// duplicate selector-eval over the soft cap) or the receiver is
    /// gone.
    pub fn enqueue(&self, item: WorkItem) -> bool {
        if let WorkItem::SelectorEval(scope) = &item {
            let over_cap = self.shared.depth.load(Ordering::Relaxed) > self.shared.config.soft_cap;
            let mut pending = self.shared.pending_selector_evals.lock();
            if over_cap && pending.contains(scope) {
                self.shared.shed.fetch_add(1, Ordering::Relaxed);
                warn!(scope = %scope, "Queue over soft cap; shedding duplicate selector-eval");
                return false;
            }
            pending.insert(scope.clone());
        }

        trace!(item = %item, "Enqueued");
        if self.tx.send(item).is_ok() {
            self.shared.depth.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Enqueue after a delay, off the reconciler's thread. Used for
    /// `RequeueAfter` outcomes.
    pub fn enqueue_after(&self, delay: Duration, item: WorkItem) {
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.enqueue(item);
        });
    }

    /// Enqueue unless the deadline has passed. Deadlines are not
    /// preemptive: they only stop an item from being (re)queued.
    pub fn enqueue_if_before(
        &self,
        deadline: chrono::DateTime<chrono::Utc>,
        item: WorkItem,
    ) -> bool {
        if chrono::Utc::now() >= deadline {
            trace!(item = %item, "Past deadline; not enqueued");
            return false;
        }
        self.enqueue(item)
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            depth: self.shared.depth.load(Ordering::Relaxed),
            shed: self.shared.shed.load(Ordering::Relaxed),
        }
    }
}

impl WorkReceiver {
    /// Receive the next item in enqueue order; `None` when every
    /// enqueue handle is dropped.
    pub async fn recv(&mut self) -> Option<WorkItem> {
        let item = self.rx.recv().await?;
        self.shared.depth.fetch_sub(1, Ordering::Relaxed);
        if let WorkItem::SelectorEval(scope) = &item {
            self.shared.pending_selector_evals.lock().remove(scope);
        }
        Some(item)
    }

    /// Non-blocking variant used by drain-style tests.
    pub fn try_recv(&mut self) -> Option<WorkItem> {
        let item = self.rx.try_recv().ok()?;
        self.shared.depth.fetch_sub(1, Ordering::Relaxed);
        if let WorkItem::SelectorEval(scope) = &item {
            self.shared.pending_selector_evals.lock().remove(scope);
        }
        Some(item)
    }
}
