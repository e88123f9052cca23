//! Relay configuration

use serde::Deserialize;
use std::time::Duration;

use crate::application::{BackoffPolicy, RelayConfig};
use crate::ports::RelayPartition;

use super::error::ValidationError;

const MAX_RETENTION_HOURS: u64 = 24 * 366;
const MAX_CLEANUP_INTERVAL_SECS: u64 = 24 * 3600;

/// Outbox relay settings
#[derive(Debug, Clone, Deserialize)]
pub struct RelaySettings {
    /// Run the relay inside this process
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Delay between polls once the outbox is drained
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Records selected per poll
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Aggregates published in parallel
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// This relay's partition
    #[serde(default)]
    pub partition_index: u32,

    /// Total number of relay partitions
    #[serde(default = "default_partition_count")]
    pub partition_count: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Failed attempts before every further failure is logged as an error
    #[serde(default = "default_alert_after_attempts")]
    pub alert_after_attempts: u32,

    /// Extra attempts to mark a published record relayed
    #[serde(default = "default_mark_retries")]
    pub mark_retries: u32,

    /// Hours relayed records are kept before being purged
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,

    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl RelaySettings {
    pub fn partition(&self) -> RelayPartition {
        RelayPartition {
            index: self.partition_index,
            count: self.partition_count,
        }
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.backoff_max_ms),
        )
    }

    /// Build the relay service configuration
    pub fn to_relay_config(&self) -> RelayConfig {
        RelayConfig::default()
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_batch_size(self.batch_size)
            .with_max_concurrency(self.max_concurrency)
            .with_partition(self.partition())
            .with_backoff(self.backoff())
            .with_alert_after_attempts(self.alert_after_attempts)
            .with_mark_retries(self.mark_retries, Duration::from_millis(100))
            .with_retention(
                Duration::from_secs(self.retention_hours.saturating_mul(3600)),
                Duration::from_secs(self.cleanup_interval_secs),
            )
    }

    /// Validate relay configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.batch_size == 0 || self.batch_size > 10_000 {
            return Err(ValidationError::InvalidBatchSize);
        }
        if self.poll_interval_ms < 10 || self.poll_interval_ms > 60_000 {
            return Err(ValidationError::InvalidPollInterval);
        }
        if self.max_concurrency == 0 {
            return Err(ValidationError::InvalidConcurrency);
        }
        if self.partition_count == 0 || self.partition_index >= self.partition_count {
            return Err(ValidationError::InvalidPartition {
                index: self.partition_index,
                count: self.partition_count,
            });
        }
        if self.backoff_base_ms == 0 || self.backoff_base_ms > self.backoff_max_ms {
            return Err(ValidationError::InvalidBackoff);
        }
        if !(1..=MAX_RETENTION_HOURS).contains(&self.retention_hours) {
            return Err(ValidationError::InvalidRetention);
        }
        if !(1..=MAX_CLEANUP_INTERVAL_SECS).contains(&self.cleanup_interval_secs) {
            return Err(ValidationError::InvalidCleanupInterval);
        }
        Ok(())
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            poll_interval_ms: default_poll_interval_ms(),
            batch_size: default_batch_size(),
            max_concurrency: default_max_concurrency(),
            partition_index: 0,
            partition_count: default_partition_count(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            alert_after_attempts: default_alert_after_attempts(),
            mark_retries: default_mark_retries(),
            retention_hours: default_retention_hours(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_batch_size() -> u32 {
    100
}

fn default_max_concurrency() -> usize {
    8
}

fn default_partition_count() -> u32 {
    1
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    300_000
}

fn default_alert_after_attempts() -> u32 {
    10
}

fn default_mark_retries() -> u32 {
    3
}

fn default_retention_hours() -> u64 {
    24
}

fn default_cleanup_interval_secs() -> u64 {
    600
}
