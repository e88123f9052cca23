//! OutboxRelay - Background service that moves outbox records to the publisher.
//!
//! Second half of the Transactional Outbox Pattern:
//! 1. Command handlers append records in the same transaction as the entity
//! 2. **OutboxRelay polls the outbox, publishes, then marks records relayed** ← This module
//!
//! ## Delivery guarantees
//!
//! - A record is marked relayed only after the publisher acknowledged it.
//!   A crash between the two steps republishes the record on restart
//!   (at-least-once).
//! - Records of one aggregate are published in ascending id order. Within a
//!   batch they form a group processed sequentially; the first failure in a
//!   group ends that group for the cycle. Different aggregates run
//!   concurrently.
//! - Transient failures are retried forever with exponential backoff.
//!   Permanent failures dead-letter the record, which holds back the rest
//!   of its aggregate until an operator requeues it.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `poll_interval` | 500ms | Delay between polls when the outbox is drained |
//! | `batch_size` | 100 | Max records selected per poll cycle |
//! | `max_concurrency` | 8 | Aggregates published in parallel |
//! | `backoff` | 500ms..5m | Delay before retrying a failed record |
//! | `alert_after_attempts` | 10 | Failed attempts before logging at error level |
//! | `mark_retries` | 3 | Extra attempts to mark a published record |
//! | `retention` | 24h | Age after which relayed records are purged |
//!
//! ## Graceful Shutdown
//!
//! The service listens on a watch channel. An in-flight batch always runs to
//! completion; the loop exits before starting the next one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::domain::foundation::{DomainError, OutboxRecordId, Timestamp};
use crate::domain::outbox::OutboxRecord;
use crate::ports::{EventPublisher, OutboxStore, PublishError, RelayPartition};

use super::BackoffPolicy;

/// Configuration for the OutboxRelay service.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// How long to wait between polls once the outbox is drained.
    pub poll_interval: Duration,

    /// Maximum records selected per poll cycle.
    pub batch_size: u32,

    /// Maximum aggregates published concurrently within a batch.
    pub max_concurrency: usize,

    /// Slice of the aggregate key space this relay owns.
    pub partition: RelayPartition,

    /// Delay policy for failed publishes and failed polls.
    pub backoff: BackoffPolicy,

    /// Failed attempts after which every further failure is logged as an error.
    pub alert_after_attempts: u32,

    /// Extra attempts to mark a record relayed after a successful publish.
    pub mark_retries: u32,

    /// Pause between mark attempts.
    pub mark_retry_delay: Duration,

    /// Relayed records older than this are purged.
    pub retention: Duration,

    /// How often the purge runs.
    pub cleanup_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            batch_size: 100,
            max_concurrency: 8,
            partition: RelayPartition::all(),
            backoff: BackoffPolicy::default(),
            alert_after_attempts: 10,
            mark_retries: 3,
            mark_retry_delay: Duration::from_millis(100),
            retention: Duration::from_secs(24 * 3600),
            cleanup_interval: Duration::from_secs(600),
        }
    }
}

impl RelayConfig {
    /// Create config with custom poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Create config with custom batch size.
    pub fn with_batch_size(mut self, size: u32) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    pub fn with_partition(mut self, partition: RelayPartition) -> Self {
        self.partition = partition;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_mark_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.mark_retries = retries;
        self.mark_retry_delay = delay;
        self
    }

    pub fn with_retention(mut self, retention: Duration, cleanup_interval: Duration) -> Self {
        self.retention = retention;
        self.cleanup_interval = cleanup_interval;
        self
    }

    pub fn with_alert_after_attempts(mut self, attempts: u32) -> Self {
        self.alert_after_attempts = attempts;
        self
    }
}

/// Outcome counters for one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    /// Records returned by the store.
    pub selected: usize,
    /// Published and marked relayed.
    pub relayed: usize,
    /// Transient publish failures, scheduled for retry.
    pub failed: usize,
    /// Permanently rejected and flagged.
    pub dead_lettered: usize,
    /// Published but the mark did not stick; will be republished.
    pub unmarked: usize,
    /// Not attempted because an earlier record of the aggregate failed.
    pub held_back: usize,
}

impl RelayReport {
    fn merge(&mut self, other: RelayReport) {
        self.relayed += other.relayed;
        self.failed += other.failed;
        self.dead_lettered += other.dead_lettered;
        self.unmarked += other.unmarked;
        self.held_back += other.held_back;
    }
}

/// What happened to a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordOutcome {
    Relayed,
    Failed,
    DeadLettered,
    Unmarked,
}

/// Background service that relays outbox records to an EventPublisher.
pub struct OutboxRelay {
    store: Arc<dyn OutboxStore>,
    publisher: Arc<dyn EventPublisher>,
    config: RelayConfig,
}

impl OutboxRelay {
    /// Create a new OutboxRelay with default configuration.
    pub fn new(store: Arc<dyn OutboxStore>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self::with_config(store, publisher, RelayConfig::default())
    }

    /// Create a new OutboxRelay with custom configuration.
    pub fn with_config(
        store: Arc<dyn OutboxStore>,
        publisher: Arc<dyn EventPublisher>,
        config: RelayConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            config,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Run the relay loop until the shutdown signal turns true or its
    /// sender is dropped.
    ///
    /// Errors never end the loop: a failed poll is logged and the next one
    /// is delayed by the backoff policy.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            batch_size = self.config.batch_size,
            partition_index = self.config.partition.index,
            partition_count = self.config.partition.count,
            "Outbox relay started"
        );

        let mut consecutive_failures: u32 = 0;
        let mut last_cleanup = Instant::now();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = match self.poll_once().await {
                Ok(report) => {
                    consecutive_failures = 0;
                    if report.relayed > 0 || report.dead_lettered > 0 {
                        tracing::info!(
                            relayed = report.relayed,
                            failed = report.failed,
                            dead_lettered = report.dead_lettered,
                            "Outbox batch relayed"
                        );
                    }
                    let drained = report.selected < self.config.batch_size as usize;
                    if drained || report.relayed == 0 {
                        self.config.poll_interval
                    } else {
                        Duration::ZERO
                    }
                }
                Err(e) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    let delay = self
                        .config
                        .backoff
                        .delay_for(consecutive_failures)
                        .max(self.config.poll_interval);
                    tracing::warn!(
                        error = %e,
                        consecutive_failures,
                        retry_in_ms = delay.as_millis() as u64,
                        "Outbox poll failed"
                    );
                    delay
                }
            };

            if last_cleanup.elapsed() >= self.config.cleanup_interval {
                last_cleanup = Instant::now();
                if let Err(e) = self.cleanup().await {
                    tracing::warn!(error = %e, "Outbox cleanup failed");
                }
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!("Outbox relay stopped");
    }

    /// Run exactly one poll cycle.
    pub async fn poll_once(&self) -> Result<RelayReport, DomainError> {
        let records = self
            .store
            .select_pending(self.config.batch_size, Timestamp::now(), self.config.partition)
            .await?;

        let mut report = RelayReport {
            selected: records.len(),
            ..Default::default()
        };
        if records.is_empty() {
            return Ok(report);
        }

        let groups = group_by_aggregate(records);
        let group_count = groups.len();

        let results: Vec<RelayReport> = stream::iter(groups)
            .map(|group| self.relay_group(group))
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        for result in results {
            report.merge(result);
        }

        tracing::debug!(
            selected = report.selected,
            aggregates = group_count,
            relayed = report.relayed,
            failed = report.failed,
            dead_lettered = report.dead_lettered,
            unmarked = report.unmarked,
            held_back = report.held_back,
            "Outbox batch processed"
        );

        Ok(report)
    }

    /// Purge relayed records past the retention window.
    pub async fn cleanup(&self) -> Result<u64, DomainError> {
        let cutoff = Timestamp::now().minus(self.config.retention);
        let purged = self.store.purge_relayed(cutoff).await?;
        if purged > 0 {
            tracing::info!(purged, "Purged relayed outbox records");
        }
        Ok(purged)
    }

    /// Publishes one aggregate's records in order, stopping at the first
    /// record that was not relayed.
    async fn relay_group(&self, records: Vec<OutboxRecord>) -> RelayReport {
        let mut report = RelayReport::default();
        let total = records.len();

        for (position, record) in records.iter().enumerate() {
            match self.relay_record(record).await {
                RecordOutcome::Relayed => {
                    report.relayed += 1;
                    continue;
                }
                RecordOutcome::Failed => report.failed += 1,
                RecordOutcome::DeadLettered => report.dead_lettered += 1,
                RecordOutcome::Unmarked => report.unmarked += 1,
            }
            report.held_back += total - position - 1;
            break;
        }

        report
    }

    async fn relay_record(&self, record: &OutboxRecord) -> RecordOutcome {
        let payload = record.payload_bytes();
        let published = self
            .publisher
            .publish(&record.event_type, &record.aggregate_id, &payload)
            .await;

        match published {
            Ok(()) => match self.mark_relayed(record.id).await {
                Ok(()) => RecordOutcome::Relayed,
                Err(e) => {
                    tracing::error!(
                        record_id = %record.id,
                        aggregate_id = %record.aggregate_id,
                        error = %e,
                        "Published outbox record could not be marked relayed; it will be republished"
                    );
                    RecordOutcome::Unmarked
                }
            },
            Err(PublishError::Transient(message)) => {
                let attempts = record.attempts.saturating_add(1);
                let delay = self.config.backoff.delay_for(attempts);
                let next_attempt_at = Timestamp::now().plus(delay);

                if attempts >= self.config.alert_after_attempts {
                    tracing::error!(
                        record_id = %record.id,
                        aggregate_id = %record.aggregate_id,
                        attempts,
                        error = %message,
                        "Outbox record keeps failing to publish"
                    );
                } else {
                    tracing::warn!(
                        record_id = %record.id,
                        aggregate_id = %record.aggregate_id,
                        attempts,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %message,
                        "Failed to publish outbox record"
                    );
                }

                if let Err(e) = self
                    .store
                    .record_failure(record.id, &message, next_attempt_at)
                    .await
                {
                    tracing::warn!(record_id = %record.id, error = %e, "Could not record publish failure");
                }
                RecordOutcome::Failed
            }
            Err(PublishError::Permanent(message)) => {
                tracing::error!(
                    record_id = %record.id,
                    aggregate_type = %record.aggregate_type,
                    aggregate_id = %record.aggregate_id,
                    event_type = %record.event_type,
                    error = %message,
                    "Outbox record rejected permanently; dead-lettered and aggregate blocked"
                );
                if let Err(e) = self.store.mark_dead_lettered(record.id, &message).await {
                    tracing::error!(record_id = %record.id, error = %e, "Could not dead-letter outbox record");
                }
                RecordOutcome::DeadLettered
            }
        }
    }

    async fn mark_relayed(&self, id: OutboxRecordId) -> Result<(), DomainError> {
        let mut attempt = 0;
        loop {
            match self.store.mark_relayed(id, Timestamp::now()).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.config.mark_retries => {
                    attempt += 1;
                    tracing::debug!(record_id = %id, attempt, error = %e, "Retrying mark relayed");
                    tokio::time::sleep(self.config.mark_retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Splits a batch into per-aggregate groups, each ascending by id.
fn group_by_aggregate(records: Vec<OutboxRecord>) -> Vec<Vec<OutboxRecord>> {
    let mut index: HashMap<(String, String), usize> = HashMap::new();
    let mut groups: Vec<Vec<OutboxRecord>> = Vec::new();

    for record in records {
        let key = (record.aggregate_type.clone(), record.aggregate_id.clone());
        match index.get(&key) {
            Some(&i) => groups[i].push(record),
            None => {
                index.insert(key, groups.len());
                groups.push(vec![record]);
            }
        }
    }

    for group in &mut groups {
        group.sort_by_key(|r| r.id);
    }
    groups
}
