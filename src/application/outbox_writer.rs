//! OutboxWriter - appends outbox records inside the caller's transaction.
//!
//! The writer never opens, commits or rolls back a transaction and never
//! talks to a publisher. It only adds a row through the handle it is given,
//! which is what ties the event to the business write.

use serde_json::Value as JsonValue;

use crate::domain::foundation::{DomainError, OutboxRecordId, Timestamp};
use crate::domain::outbox::{ExportedEvent, OutboxRecord};
use crate::ports::StoreTransaction;

/// Writes outbox records through a caller-supplied transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutboxWriter;

impl OutboxWriter {
    pub fn new() -> Self {
        Self
    }

    /// Appends one pending record and returns its time-ordered id.
    ///
    /// The aggregate is locked for the rest of the transaction before the id
    /// is generated. Another transaction appending to the same aggregate
    /// waits here until this one finishes, so ids of one aggregate commit in
    /// increasing order.
    ///
    /// A store failure is returned as is; the caller must let its
    /// transaction roll back so the business write is discarded too.
    pub async fn append(
        &self,
        tx: &mut dyn StoreTransaction,
        aggregate_type: &str,
        aggregate_id: &str,
        event_type: &str,
        payload: JsonValue,
        occurred_at: Timestamp,
    ) -> Result<OutboxRecordId, DomainError> {
        tx.lock_aggregate(aggregate_type, aggregate_id).await?;

        let record = OutboxRecord::new(aggregate_type, aggregate_id, event_type, payload, occurred_at);
        tx.insert_outbox_record(&record).await?;

        tracing::debug!(
            record_id = %record.id,
            aggregate_type,
            aggregate_id,
            event_type,
            "Appended outbox record"
        );

        Ok(record.id)
    }

    /// Appends a record for an exported event.
    pub async fn append_event(
        &self,
        tx: &mut dyn StoreTransaction,
        event: &dyn ExportedEvent,
    ) -> Result<OutboxRecordId, DomainError> {
        self.append(
            tx,
            event.aggregate_type(),
            &event.aggregate_id(),
            event.event_type(),
            event.payload(),
            event.occurred_at(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryStore;
    use crate::ports::TransactionalStore;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn append_writes_through_the_given_transaction() {
        let store = InMemoryStore::new();
        let writer = OutboxWriter::new();
        let occurred_at = Timestamp::now();

        let mut tx = store.begin().await.unwrap();
        let id = writer
            .append(tx.as_mut(), "Order", "42", "OrderCreated", json!({"id": 42}), occurred_at)
            .await
            .unwrap();

        // Not visible before commit
        assert!(store.outbox_record(id).is_none());

        tx.commit().await.unwrap();

        let record = store.outbox_record(id).unwrap();
        assert_eq!(record.aggregate_type, "Order");
        assert_eq!(record.aggregate_id, "42");
        assert_eq!(record.event_type, "OrderCreated");
        assert_eq!(record.payload, json!({"id": 42}));
        assert_eq!(record.created_at, occurred_at);
        assert!(record.is_pending());
    }

    #[tokio::test]
    async fn append_propagates_store_failure() {
        let store = InMemoryStore::new();
        store.fail_outbox_inserts(true);

        let mut tx = store.begin().await.unwrap();
        let result = OutboxWriter::new()
            .append(tx.as_mut(), "Order", "1", "OrderCreated", json!({}), Timestamp::now())
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn successive_appends_get_increasing_ids() {
        let store = InMemoryStore::new();
        let writer = OutboxWriter::new();

        let mut tx = store.begin().await.unwrap();
        let first = writer
            .append(tx.as_mut(), "Order", "1", "OrderCreated", json!({}), Timestamp::now())
            .await
            .unwrap();
        let second = writer
            .append(tx.as_mut(), "Order", "1", "OrderShipped", json!({}), Timestamp::now())
            .await
            .unwrap();

        assert!(first < second);
    }

    #[tokio::test]
    async fn writer_waits_for_open_transaction_on_same_aggregate() {
        let store = InMemoryStore::new();
        let writer = OutboxWriter::new();

        let mut first_tx = store.begin().await.unwrap();
        let first = writer
            .append(first_tx.as_mut(), "Order", "x", "OrderEvent", json!({}), Timestamp::now())
            .await
            .unwrap();

        let second = tokio::spawn({
            let store = store.clone();
            async move {
                let mut tx = store.begin().await?;
                let id = OutboxWriter::new()
                    .append(tx.as_mut(), "Order", "x", "OrderEvent", json!({}), Timestamp::now())
                    .await?;
                tx.commit().await?;
                Ok::<_, DomainError>(id)
            }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!second.is_finished());

        first_tx.commit().await.unwrap();
        let second = tokio::time::timeout(Duration::from_secs(1), second)
            .await
            .expect("second writer never got the aggregate")
            .unwrap()
            .unwrap();

        assert!(first < second);
        let ids: Vec<_> = store.outbox_records().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[tokio::test]
    async fn dropped_transaction_releases_its_aggregate() {
        let store = InMemoryStore::new();
        let writer = OutboxWriter::new();

        {
            let mut tx = store.begin().await.unwrap();
            writer
                .append(tx.as_mut(), "Order", "x", "OrderEvent", json!({}), Timestamp::now())
                .await
                .unwrap();
        }

        let mut tx = store.begin().await.unwrap();
        let append = writer.append(tx.as_mut(), "Order", "x", "OrderEvent", json!({}), Timestamp::now());
        let id = tokio::time::timeout(Duration::from_secs(1), append)
            .await
            .expect("aggregate still locked")
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.outbox_records().len(), 1);
        assert_eq!(store.outbox_records()[0].id, id);
    }

    #[tokio::test]
    async fn other_aggregates_are_not_blocked() {
        let store = InMemoryStore::new();
        let writer = OutboxWriter::new();

        let mut first_tx = store.begin().await.unwrap();
        writer
            .append(first_tx.as_mut(), "Order", "x", "OrderEvent", json!({}), Timestamp::now())
            .await
            .unwrap();

        let mut second_tx = store.begin().await.unwrap();
        let append = writer.append(second_tx.as_mut(), "Order", "y", "OrderEvent", json!({}), Timestamp::now());
        assert!(tokio::time::timeout(Duration::from_secs(1), append).await.is_ok());
    }
}
