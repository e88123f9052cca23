//! RequeueDeadLetterHandler - hands a dead-lettered record back to the relay.

use std::sync::Arc;

use crate::domain::foundation::{DomainError, OutboxRecordId};
use crate::ports::OutboxStore;

/// Command to requeue a dead-lettered record.
#[derive(Debug, Clone, Copy)]
pub struct RequeueDeadLetterCommand {
    pub record_id: OutboxRecordId,
}

/// Handler for operator requeues.
pub struct RequeueDeadLetterHandler {
    store: Arc<dyn OutboxStore>,
}

impl RequeueDeadLetterHandler {
    pub fn new(store: Arc<dyn OutboxStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, cmd: RequeueDeadLetterCommand) -> Result<(), DomainError> {
        self.store.requeue(cmd.record_id).await?;
        tracing::info!(record_id = %cmd.record_id, "Requeued dead-lettered outbox record");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryStore;
    use crate::domain::foundation::{ErrorCode, Timestamp};
    use crate::domain::outbox::{OutboxRecord, OutboxStatus};
    use serde_json::json;

    #[tokio::test]
    async fn requeue_returns_record_to_pending() {
        let store = InMemoryStore::new();
        let record = OutboxRecord::new("Order", "1", "OrderCreated", json!({}), Timestamp::now());
        store.seed_outbox([record.clone()]);
        store.mark_dead_lettered(record.id, "rejected").await.unwrap();

        let handler = RequeueDeadLetterHandler::new(Arc::new(store.clone()));
        handler
            .handle(RequeueDeadLetterCommand { record_id: record.id })
            .await
            .unwrap();

        let stored = store.outbox_record(record.id).unwrap();
        assert_eq!(stored.status, OutboxStatus::Pending);
        assert_eq!(stored.attempts, 0);
    }

    #[tokio::test]
    async fn requeue_rejects_pending_records() {
        let store = InMemoryStore::new();
        let record = OutboxRecord::new("Order", "1", "OrderCreated", json!({}), Timestamp::now());
        store.seed_outbox([record.clone()]);

        let err = RequeueDeadLetterHandler::new(Arc::new(store))
            .handle(RequeueDeadLetterCommand { record_id: record.id })
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::InvalidStateTransition);
    }
}
