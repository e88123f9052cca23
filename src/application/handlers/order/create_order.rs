//! CreateOrderHandler - persists an order and its OrderCreated event atomically.

use std::sync::Arc;

use crate::application::OutboxWriter;
use crate::domain::foundation::{OutboxRecordId, Timestamp};
use crate::domain::order::{NewOrder, Order, OrderCreated, OrderError};
use crate::ports::TransactionalStore;

/// Command to create a new order.
#[derive(Debug, Clone)]
pub struct CreateOrderCommand {
    pub number: String,
    pub customer_id: String,
}

/// Result of successful order creation.
#[derive(Debug, Clone)]
pub struct CreateOrderResult {
    pub order: Order,
    pub outbox_record_id: OutboxRecordId,
}

/// Handler for creating orders.
pub struct CreateOrderHandler {
    store: Arc<dyn TransactionalStore>,
    writer: OutboxWriter,
}

impl CreateOrderHandler {
    pub fn new(store: Arc<dyn TransactionalStore>, writer: OutboxWriter) -> Self {
        Self { store, writer }
    }

    pub async fn handle(&self, cmd: CreateOrderCommand) -> Result<CreateOrderResult, OrderError> {
        // 1. Validate before touching the store
        let input = NewOrder::new(cmd.number, cmd.customer_id)?;

        // 2. One transaction for both writes. Any early return drops `tx`,
        //    which discards everything written so far.
        let mut tx = self.store.begin().await?;

        // 3. Entity first: the event needs the generated id
        let order = tx.insert_order(input).await?;

        // 4. Outbox record in the same transaction
        let event = OrderCreated::from_order(&order, Timestamp::now());
        let outbox_record_id = self.writer.append_event(tx.as_mut(), &event).await?;

        // 5. Both rows become visible together
        tx.commit().await?;

        tracing::info!(
            order_id = %order.id(),
            record_id = %outbox_record_id,
            "Order created"
        );

        Ok(CreateOrderResult {
            order,
            outbox_record_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryStore;
    use crate::domain::foundation::{ErrorCode, OrderId};
    use serde_json::json;

    fn handler(store: &InMemoryStore) -> CreateOrderHandler {
        CreateOrderHandler::new(Arc::new(store.clone()), OutboxWriter::new())
    }

    fn command(number: &str, customer_id: &str) -> CreateOrderCommand {
        CreateOrderCommand {
            number: number.to_string(),
            customer_id: customer_id.to_string(),
        }
    }

    #[tokio::test]
    async fn creates_order_and_exactly_one_outbox_record() {
        let store = InMemoryStore::new().with_next_order_id(42);

        let result = handler(&store).handle(command("A-100", "C-1")).await.unwrap();

        assert_eq!(result.order.id(), OrderId::new(42));
        let records = store.outbox_records();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.id, result.outbox_record_id);
        assert_eq!(record.aggregate_type, "Order");
        assert_eq!(record.aggregate_id, "42");
        assert_eq!(record.event_type, "OrderCreated");
        assert_eq!(
            record.payload,
            json!({"id": 42, "number": "A-100", "customerId": "C-1"})
        );
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_the_store() {
        let store = InMemoryStore::new();
        // A store failure would surface as a persistence error instead
        store.fail_order_inserts(true);

        let err = handler(&store).handle(command("", "C-1")).await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::ValidationFailed);
        assert!(store.orders().is_empty());
    }

    #[tokio::test]
    async fn order_insert_failure_leaves_nothing_behind() {
        let store = InMemoryStore::new();
        store.fail_order_inserts(true);

        let err = handler(&store).handle(command("A-1", "C-1")).await.unwrap_err();

        assert!(matches!(err, OrderError::Persistence(_)));
        assert!(store.orders().is_empty());
        assert!(store.outbox_records().is_empty());
    }

    #[tokio::test]
    async fn outbox_failure_rolls_back_the_order() {
        let store = InMemoryStore::new();
        store.fail_outbox_inserts(true);

        let err = handler(&store).handle(command("A-1", "C-1")).await.unwrap_err();

        assert!(matches!(err, OrderError::Persistence(_)));
        assert!(store.orders().is_empty());
        assert!(store.outbox_records().is_empty());
    }

    #[tokio::test]
    async fn commit_failure_leaves_nothing_behind() {
        let store = InMemoryStore::new();
        store.fail_commits(true);

        assert!(handler(&store).handle(command("A-1", "C-1")).await.is_err());
        assert!(store.orders().is_empty());
        assert!(store.outbox_records().is_empty());
    }
}
