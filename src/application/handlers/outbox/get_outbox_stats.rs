//! GetOutboxStatsHandler - read-only counts for operational visibility.

use std::sync::Arc;

use crate::domain::foundation::DomainError;
use crate::domain::outbox::OutboxStats;
use crate::ports::OutboxStore;

/// Handler for outbox counts.
pub struct GetOutboxStatsHandler {
    store: Arc<dyn OutboxStore>,
}

impl GetOutboxStatsHandler {
    pub fn new(store: Arc<dyn OutboxStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self) -> Result<OutboxStats, DomainError> {
        self.store.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryStore;
    use crate::domain::foundation::Timestamp;
    use crate::domain::outbox::OutboxRecord;
    use serde_json::json;

    #[tokio::test]
    async fn reports_pending_records() {
        let store = InMemoryStore::new();
        store.seed_outbox([
            OutboxRecord::new("Order", "1", "OrderCreated", json!({}), Timestamp::now()),
            OutboxRecord::new("Order", "2", "OrderCreated", json!({}), Timestamp::now()),
        ]);

        let stats = GetOutboxStatsHandler::new(Arc::new(store)).handle().await.unwrap();

        assert_eq!(stats.pending, 2);
        assert_eq!(stats.dead_lettered, 0);
        assert!(stats.oldest_pending_at.is_some());
    }
}
