//! Configuration types with serde defaults.

use serde::{Deserialize, Serialize};

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub queue: QueueConfig,
    pub verification: VerificationConfig,
    pub change_stream: ChangeStreamConfig,
}

/// Work queue tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Above this depth, duplicate selector-eval items are shed.
    pub soft_cap: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { soft_cap: 4096 }
    }
}

/// Verification machine tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Backoff, in seconds, after a transient provider failure.
    pub transient_backoff_secs: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            transient_backoff_secs: 10,
        }
    }
}

/// Change record stream tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeStreamConfig {
    /// Broadcast buffer, in batches; lagging subscribers lose the
    /// oldest batches beyond it.
    pub buffer: usize,
}

impl Default for ChangeStreamConfig {
    fn default() -> Self {
        Self { buffer: 256 }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_queue_soft_cap(mut self, soft_cap: usize) -> Self {
        self.queue.soft_cap = soft_cap;
        self
    }

    pub fn with_transient_backoff_secs(mut self, secs: u64) -> Self {
        self.verification.transient_backoff_secs = secs;
        self
    }

    pub fn with_change_stream_buffer(mut self, buffer: usize) -> Self {
        self.change_stream.buffer = buffer;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.queue.soft_cap, 4096);
        assert_eq!(config.verification.transient_backoff_secs, 10);
        assert_eq!(config.change_stream.buffer, 256);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [queue]
            soft_cap = 128
            "#,
        )
        .unwrap();
        assert_eq!(config.queue.soft_cap, 128);
        assert_eq!(config.change_stream.buffer, 256);
    }

    #[test]
    fn test_builder_methods() {
        let config = EngineConfig::new()
            .with_queue_soft_cap(10)
            .with_transient_backoff_secs(3)
            .with_change_stream_buffer(8);
        assert_eq!(config.queue.soft_cap, 10);
        assert_eq!(config.verification.transient_backoff_secs, 3);
        assert_eq!(config.change_stream.buffer, 8);
    }
}
