//! OutboxStore port - relay-side and diagnostic access to the outbox table.
//!
//! Only the relay (and the operator diagnostics built on the same port)
//! mutate outbox rows after they were inserted. The writer side lives in
//! [`StoreTransaction`](super::StoreTransaction).

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, OutboxRecordId, Timestamp};
use crate::domain::outbox::{OutboxRecord, OutboxStats};

/// A slice of the aggregate key space owned by one relay process.
///
/// Several relays may run side by side as long as each has a distinct
/// `index` with the same `count`: every aggregate maps to exactly one
/// partition, so no two relays ever publish records of the same aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayPartition {
    pub index: u32,
    pub count: u32,
}

impl RelayPartition {
    /// The whole key space.
    pub fn all() -> Self {
        Self { index: 0, count: 1 }
    }

    pub fn is_all(&self) -> bool {
        self.count <= 1
    }

    /// Whether an aggregate belongs to this partition.
    ///
    /// Uses FNV-1a over `type:id`; stores that filter in SQL may use their
    /// own stable hash as long as they are consistent with themselves.
    pub fn contains(&self, aggregate_type: &str, aggregate_id: &str) -> bool {
        if self.is_all() {
            return true;
        }
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in aggregate_type
            .bytes()
            .chain(std::iter::once(b':'))
            .chain(aggregate_id.bytes())
        {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x100000001b3);
        }
        hash % u64::from(self.count) == u64::from(self.index)
    }
}

impl Default for RelayPartition {
    fn default() -> Self {
        Self::all()
    }
}

/// Port for reading and advancing outbox records.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Returns up to `limit` records the relay may publish at `now`,
    /// ascending by id.
    ///
    /// A record is selectable when it is pending, due, inside `partition`,
    /// and no earlier record of the same aggregate is dead-lettered or
    /// still backing off.
    async fn select_pending(
        &self,
        limit: u32,
        now: Timestamp,
        partition: RelayPartition,
    ) -> Result<Vec<OutboxRecord>, DomainError>;

    /// Marks a record relayed. Relayed records are never selected again.
    async fn mark_relayed(&self, id: OutboxRecordId, at: Timestamp) -> Result<(), DomainError>;

    /// Records a failed publish attempt; the record stays pending and is not
    /// selected before `next_attempt_at`.
    async fn record_failure(
        &self,
        id: OutboxRecordId,
        error: &str,
        next_attempt_at: Timestamp,
    ) -> Result<(), DomainError>;

    /// Flags a record the publisher rejected permanently.
    async fn mark_dead_lettered(&self, id: OutboxRecordId, reason: &str)
        -> Result<(), DomainError>;

    /// Returns a dead-lettered record to pending with a clean retry state.
    async fn requeue(&self, id: OutboxRecordId) -> Result<(), DomainError>;

    /// Deletes relayed records relayed before `older_than`. Never touches
    /// pending or dead-lettered records.
    async fn purge_relayed(&self, older_than: Timestamp) -> Result<u64, DomainError>;

    /// Counts for diagnostics.
    async fn stats(&self) -> Result<OutboxStats, DomainError>;

    /// Oldest non-relayed records, for inspection.
    async fn list_unrelayed(&self, limit: u32) -> Result<Vec<OutboxRecord>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_partition_contains_everything() {
        let all = RelayPartition::all();
        assert!(all.contains("Order", "1"));
        assert!(all.contains("Order", "2"));
    }

    #[test]
    fn every_aggregate_lands_in_exactly_one_partition() {
        let count = 4;
        for id in 0..200 {
            let aggregate_id = id.to_string();
            let owners = (0..count)
                .filter(|index| RelayPartition { index: *index, count }.contains("Order", &aggregate_id))
                .count();
            assert_eq!(owners, 1, "aggregate {} owned by {} partitions", aggregate_id, owners);
        }
    }
}
