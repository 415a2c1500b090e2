//! The verification sub-machine.
//!
//! A verification watches one release target through a set of
//! metrics. Each metric accumulates measurements on its own interval
//! until it reaches a terminal state; the overall verification is
//! running while any metric runs, failed when none runs and any
//! failed, passed otherwise. A terminal metric asks the caller to
//! re-evaluate the affected release target.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, warn};

use keel_types::ReleaseTargetKey;

use crate::error::ReconcileError;
use crate::provider::MetricProvider;

/// One metric's sampling plan.
#[derive(Debug, Clone)]
pub struct MetricSpec {
    pub name: String,
    /// Provider registry key.
    pub provider: String,
    /// Opaque provider configuration (query, URL, ...).
    pub config: serde_json::Value,
    /// Target number of measurements.
    pub count: usize,
    /// Terminal pass once this many trailing measurements all passed.
    pub success_threshold: Option<usize>,
    /// Terminal failure once more than this many measurements failed.
    pub failure_threshold: Option<usize>,
    pub interval: Duration,
}

/// A verification as registered by the embedder.
#[derive(Debug, Clone)]
pub struct Verification {
    pub id: String,
    pub release_target: ReleaseTargetKey,
    pub metrics: Vec<MetricSpec>,
}

/// One sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    pub passed: bool,
    pub taken_at: DateTime<Utc>,
}

/// Per-metric progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricStatus {
    Running,
    Passed,
    Failed,
}

/// Aggregated verification status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStatus {
    Running,
    Passed,
    Failed,
}

/// What one tick decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not yet due, or more measurements needed: come back later.
    Requeue(Duration),
    /// The metric reached a terminal state; the caller enqueues a
    /// desired-release re-evaluation for the target.
    Terminal {
        status: MetricStatus,
        release_target: ReleaseTargetKey,
    },
    /// Unknown verification or metric index; nothing to do.
    NotFound,
}

struct MetricState {
    spec: MetricSpec,
    measurements: Vec<Measurement>,
    status: MetricStatus,
}

impl MetricState {
    /// Apply the spec's terminal conditions after a new measurement.
    fn settle(&mut self) {
        let failed = self.measurements.iter().filter(|m| !m.passed).count();
        if let Some(threshold) = self.spec.failure_threshold {
            if failed > threshold {
                self.status = MetricStatus::Failed;
                return;
            }
        }
        if let Some(threshold) = self.spec.success_threshold {
            if threshold > 0 && self.measurements.len() >= threshold {
                let trailing = &self.measurements[self.measurements.len() - threshold..];
                if trailing.iter().all(|m| m.passed) {
                    self.status = MetricStatus::Passed;
                    return;
                }
            }
        }
        if self.measurements.len() >= self.spec.count {
            self.status = if self.measurements.iter().all(|m| m.passed) {
                MetricStatus::Passed
            } else {
                MetricStatus::Failed
            };
        }
    }
}

struct VerificationState {
    release_target: ReleaseTargetKey,
    metrics: Vec<MetricState>,
}

impl VerificationState {
    fn status(&self) -> VerificationStatus {
        if self
            .metrics
            .iter()
            .any(|m| m.status == MetricStatus::Running)
        {
            VerificationStatus::Running
        } else if self.metrics.iter().any(|m| m.status == MetricStatus::Failed) {
            VerificationStatus::Failed
        } else {
            VerificationStatus::Passed
        }
    }
}

/// Registry and driver of verification state.
pub struct VerificationStore {
    providers: HashMap<String, Arc<dyn MetricProvider>>,
    verifications: RwLock<HashMap<String, VerificationState>>,
    /// Backoff applied when a provider fails transiently.
    transient_backoff: Duration,
}

impl VerificationStore {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            verifications: RwLock::new(HashMap::new()),
            transient_backoff: Duration::from_secs(10),
        }
    }

    pub fn with_provider(
        mut self,
        name: impl Into<String>,
        provider: Arc<dyn MetricProvider>,
    ) -> Self {
        self.providers.insert(name.into(), provider);
        self
    }

    pub fn with_transient_backoff(mut self, backoff: Duration) -> Self {
        self.transient_backoff = backoff;
        self
    }

    /// Register a verification; its metrics start running and expect
    /// one `VerificationTick` item per metric to be enqueued.
    pub fn register(&self, verification: Verification) {
        let state = VerificationState {
            release_target: verification.release_target,
            metrics: verification
                .metrics
                .into_iter()
                .map(|spec| MetricState {
                    spec,
                    measurements: Vec::new(),
                    status: MetricStatus::Running,
                })
                .collect(),
        };
        self.verifications
            .write()
            .insert(verification.id, state);
    }

    pub fn remove(&self, verification_id: &str) {
        self.verifications.write().remove(verification_id);
    }

    /// Advance one metric one step.
    pub async fn tick(
        &self,
        verification_id: &str,
        metric_index: usize,
        now: DateTime<Utc>,
    ) -> TickOutcome {
        // Snapshot what the sample needs; the lock is never held
        // across the provider call.
        let (spec, last_taken, release_target) = {
            let verifications = self.verifications.read();
            let Some(state) = verifications.get(verification_id) else {
                return TickOutcome::NotFound;
            };
            let Some(metric) = state.metrics.get(metric_index) else {
                return TickOutcome::NotFound;
            };
            if metric.status != MetricStatus::Running {
                return TickOutcome::Terminal {
                    status: metric.status,
                    release_target: state.release_target.clone(),
                };
            }
            (
                metric.spec.clone(),
                metric.measurements.last().map(|m| m.taken_at),
                state.release_target.clone(),
            )
        };

        if let Some(taken_at) = last_taken {
            let elapsed = (now - taken_at)
                .to_std()
                .unwrap_or(Duration::ZERO);
            if elapsed < spec.interval {
                return TickOutcome::Requeue(spec.interval - elapsed);
            }
        }

        let Some(provider) = self.providers.get(&spec.provider) else {
            warn!(metric = %spec.name, provider = %spec.provider, "Unknown metric provider");
            return TickOutcome::NotFound;
        };

        let passed = match provider.measure(&spec).await {
            Ok(passed) => passed,
            Err(ReconcileError::Transient(reason)) => {
                debug!(metric = %spec.name, reason = %reason, "Transient provider failure; backing off");
                return TickOutcome::Requeue(self.transient_backoff);
            }
            Err(err) => {
                warn!(metric = %spec.name, error = %err, "Provider error treated as failed measurement");
                false
            }
        };

        let mut verifications = self.verifications.write();
        let Some(state) = verifications.get_mut(verification_id) else {
            return TickOutcome::NotFound;
        };
        let Some(metric) = state.metrics.get_mut(metric_index) else {
            return TickOutcome::NotFound;
        };
        metric.measurements.push(Measurement {
            passed,
            taken_at: now,
        });
        metric.settle();

        match metric.status {
            MetricStatus::Running => TickOutcome::Requeue(spec.interval),
            status => {
                debug!(
                    verification = %verification_id,
                    metric = %spec.name,
                    ?status,
                    "Metric reached terminal state"
                );
                TickOutcome::Terminal {
                    status,
                    release_target: state.release_target.clone(),
                }
            }
        }
    }

    /// Aggregated status, `None` for unknown verifications.
    pub fn status(&self, verification_id: &str) -> Option<VerificationStatus> {
        self.verifications
            .read()
            .get(verification_id)
            .map(VerificationState::status)
    }

    /// Measurements taken so far for one metric.
    pub fn measurements(&self, verification_id: &str, metric_index: usize) -> Vec<Measurement> {
        self.verifications
            .read()
            .get(verification_id)
            .and_then(|state| state.metrics.get(metric_index))
            .map(|metric| metric.measurements.clone())
            .unwrap_or_default()
    }
}

impl Default for VerificationStore {
    fn default() -> Self {
        Self::new()
    }
}
