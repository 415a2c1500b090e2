//! Engine construction.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use keel_config::EngineConfig;
use keel_expr::SelectorCache;
use keel_reconcile::{MetricProvider, QueueConfig, VerificationStore, work_queue};
use keel_relations::RelationshipCache;
use keel_release::ReleaseDecider;
use keel_store::{ChangeRecorder, EntityStore};
use keel_targets::TargetMaterializer;

use crate::engine::Engine;

/// Builds an [`Engine`], optionally with verification metric
/// providers and a non-default configuration.
pub struct EngineBuilder {
    config: EngineConfig,
    providers: Vec<(String, Arc<dyn MetricProvider>)>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            providers: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a verification metric provider under a name metric
    /// specs refer to.
    pub fn with_metric_provider(
        mut self,
        name: impl Into<String>,
        provider: Arc<dyn MetricProvider>,
    ) -> Self {
        self.providers.push((name.into(), provider));
        self
    }

    pub fn build(self) -> Engine {
        let recorder = Arc::new(ChangeRecorder::new(self.config.change_stream.buffer));
        let store = Arc::new(EntityStore::new(recorder));
        let selectors = Arc::new(SelectorCache::new());
        let relations = Arc::new(RelationshipCache::new(
            Arc::clone(&store),
            Arc::clone(&selectors),
        ));
        let targets = Arc::new(TargetMaterializer::new(
            Arc::clone(&store),
            Arc::clone(&selectors),
        ));
        let decider = Arc::new(ReleaseDecider::new(
            Arc::clone(&store),
            Arc::clone(&selectors),
            Arc::clone(&relations),
        ));

        let mut verifications = VerificationStore::new().with_transient_backoff(
            Duration::from_secs(self.config.verification.transient_backoff_secs),
        );
        for (name, provider) in self.providers {
            verifications = verifications.with_provider(name, provider);
        }

        let (queue, receiver) = work_queue(
            QueueConfig::new().with_soft_cap(self.config.queue.soft_cap),
        );

        Engine {
            config: self.config,
            store,
            selectors,
            relations,
            targets,
            verifications: Arc::new(verifications),
            decider,
            desired: Arc::new(RwLock::new(BTreeMap::new())),
            queue,
            receiver: Some(receiver),
        }
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
