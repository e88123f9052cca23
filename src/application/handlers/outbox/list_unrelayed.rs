//! ListUnrelayedHandler - inspect records that have not been relayed yet.

use std::sync::Arc;

use crate::domain::foundation::DomainError;
use crate::domain::outbox::OutboxRecord;
use crate::ports::OutboxStore;

/// Largest page the handler will return.
pub const MAX_LIST_LIMIT: u32 = 500;

/// Query for pending and dead-lettered records, oldest first.
#[derive(Debug, Clone, Copy)]
pub struct ListUnrelayedQuery {
    pub limit: u32,
}

impl Default for ListUnrelayedQuery {
    fn default() -> Self {
        Self { limit: 50 }
    }
}

/// Handler for outbox inspection.
pub struct ListUnrelayedHandler {
    store: Arc<dyn OutboxStore>,
}

impl ListUnrelayedHandler {
    pub fn new(store: Arc<dyn OutboxStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, query: ListUnrelayedQuery) -> Result<Vec<OutboxRecord>, DomainError> {
        let limit = query.limit.clamp(1, MAX_LIST_LIMIT);
        self.store.list_unrelayed(limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryStore;
    use crate::domain::foundation::Timestamp;
    use serde_json::json;

    #[tokio::test]
    async fn lists_oldest_first_and_clamps_limit() {
        let store = InMemoryStore::new();
        let records: Vec<_> = (0..3)
            .map(|i| OutboxRecord::new("Order", i.to_string(), "OrderCreated", json!({}), Timestamp::now()))
            .collect();
        store.seed_outbox(records.clone());
        let handler = ListUnrelayedHandler::new(Arc::new(store));

        let listed = handler.handle(ListUnrelayedQuery { limit: 2 }).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, records[0].id);

        let listed = handler.handle(ListUnrelayedQuery { limit: 0 }).await.unwrap();
        assert_eq!(listed.len(), 1);
    }
}
