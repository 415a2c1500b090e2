//! The reconciler loop.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::item::{Outcome, WorkItem};
use crate::queue::{WorkQueue, WorkReceiver};

/// Implemented by the engine: executes one work item to completion.
///
/// Handlers must be idempotent (the queue does not deduplicate, so
/// the same logical input may arrive any number of times) and must
/// honor the cancellation token at natural iteration boundaries. A
/// cancelled handler returns without recording changes or enqueuing
/// follow-ups.
#[async_trait]
pub trait WorkHandler: Send + Sync {
    async fn handle(&self, item: WorkItem, cancel: &CancellationToken) -> Outcome;
}

/// A single-threaded cooperative reconciler draining one queue.
pub struct Reconciler<H: WorkHandler> {
    handler: H,
    queue: WorkQueue,
    receiver: WorkReceiver,
}

impl<H: WorkHandler> std::fmt::Debug for Reconciler<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").finish_non_exhaustive()
    }
}

impl<H: WorkHandler> Reconciler<H> {
    pub fn new(handler: H, queue: WorkQueue, receiver: WorkReceiver) -> Self {
        Self {
            handler,
            queue,
            receiver,
        }
    }

    /// Drain the queue until cancelled or every enqueue handle is
    /// dropped. The current item always finishes; cancellation is
    /// observed between items.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Reconciler started");
        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                item = self.receiver.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            debug!(item = %item, "Handling work item");
            match self.handler.handle(item.clone(), &cancel).await {
                Outcome::Done => {}
                Outcome::RequeueAfter(delay) => {
                    if !cancel.is_cancelled() {
                        self.queue.enqueue_after(delay, item);
                    }
                }
            }
        }
        info!("Reconciler stopped");
    }

    /// Drain whatever is currently queued, without waiting for more.
    /// Follow-up items enqueued by handlers are processed too; the
    /// call returns once the queue is momentarily empty. Used by
    /// embedders that drive reconciliation synchronously (and by
    /// tests).
    pub async fn drain(&mut self, cancel: &CancellationToken) -> usize {
        let mut handled = 0;
        while !cancel.is_cancelled() {
            let Some(item) = self.receiver.try_recv() else {
                break;
            };
            debug!(item = %item, "Handling work item");
            match self.handler.handle(item.clone(), cancel).await {
                Outcome::Done => {}
                Outcome::RequeueAfter(delay) => {
                    if !cancel.is_cancelled() {
                        self.queue.enqueue_after(delay, item);
                    }
                }
            }
            handled += 1;
        }
        handled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::SelectorScope;
    use crate::queue::{QueueConfig, work_queue};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    struct RecordingHandler {
        seen: Arc<Mutex<Vec<WorkItem>>>,
        requeue_once: Mutex<bool>,
    }

    #[async_trait]
    impl WorkHandler for RecordingHandler {
        async fn handle(&self, item: WorkItem, _cancel: &CancellationToken) -> Outcome {
            self.seen.lock().push(item);
            let mut requeue = self.requeue_once.lock();
            if *requeue {
                *requeue = false;
                return Outcome::RequeueAfter(Duration::from_millis(5));
            }
            Outcome::Done
        }
    }

    fn selector_item(id: &str) -> WorkItem {
        WorkItem::SelectorEval(SelectorScope::Environment(id.into()))
    }

    #[tokio::test]
    async fn test_items_handled_in_order() {
        let (queue, receiver) = work_queue(QueueConfig::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler = RecordingHandler {
            seen: Arc::clone(&seen),
            requeue_once: Mutex::new(false),
        };
        let mut reconciler = Reconciler::new(handler, queue.clone(), receiver);

        queue.enqueue(selector_item("env-1"));
        queue.enqueue(selector_item("env-2"));
        let cancel = CancellationToken::new();
        let handled = reconciler.drain(&cancel).await;

        assert_eq!(handled, 2);
        let seen = seen.lock();
        assert_eq!(seen[0], selector_item("env-1"));
        assert_eq!(seen[1], selector_item("env-2"));
    }

    #[tokio::test]
    async fn test_requeue_after_redelivers() {
        let (queue, receiver) = work_queue(QueueConfig::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler = RecordingHandler {
            seen: Arc::clone(&seen),
            requeue_once: Mutex::new(true),
        };
        let reconciler = Reconciler::new(handler, queue.clone(), receiver);

        queue.enqueue(selector_item("env-1"));
        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let task = tokio::spawn(reconciler.run(run_cancel));

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        task.await.unwrap();

        // Handled once, requeued, handled again.
        assert_eq!(seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_stops_loop() {
        let (queue, receiver) = work_queue(QueueConfig::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler = RecordingHandler {
            seen: Arc::clone(&seen),
            requeue_once: Mutex::new(false),
        };
        let reconciler = Reconciler::new(handler, queue.clone(), receiver);

        let cancel = CancellationToken::new();
        cancel.cancel();
        reconciler.run(cancel).await;

        // Items enqueued after the loop exits are never handled.
        queue.enqueue(selector_item("env-1"));
        assert!(seen.lock().is_empty());
    }
}
