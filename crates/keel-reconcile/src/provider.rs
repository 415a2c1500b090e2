//! Verification metric providers.
//!
//! Providers are opaque to the core: given a metric spec they produce
//! one pass/fail sample. Real providers (Prometheus queries, sleeps,
//! HTTP probes) live outside; the built-in ones cover wiring and
//! tests.

use async_trait::async_trait;

use crate::error::Result;
use crate::verify::MetricSpec;

/// One measurement source.
#[async_trait]
pub trait MetricProvider: Send + Sync {
    /// Take one sample: `true` is a passing measurement. A
    /// `Transient` error converts to a requeue with backoff rather
    /// than a failed measurement.
    async fn measure(&self, metric: &MetricSpec) -> Result<bool>;
}

/// A provider that always returns the same result.
pub struct StaticProvider {
    result: bool,
}

impl StaticProvider {
    pub fn passing() -> Self {
        Self { result: true }
    }

    pub fn failing() -> Self {
        Self { result: false }
    }
}

#[async_trait]
impl MetricProvider for StaticProvider {
    async fn measure(&self, _metric: &MetricSpec) -> Result<bool> {
        Ok(self.result)
    }
}
