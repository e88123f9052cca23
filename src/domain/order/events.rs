//! Events emitted by the order aggregate.

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::domain::foundation::{OrderId, Timestamp};
use crate::domain::outbox::ExportedEvent;

use super::Order;

pub const ORDER_AGGREGATE_TYPE: &str = "Order";
pub const ORDER_CREATED_EVENT_TYPE: &str = "OrderCreated";

/// Published once per order, derived from the persisted entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    pub id: OrderId,
    pub number: String,
    pub customer_id: String,
    #[serde(skip)]
    pub occurred_at: Timestamp,
}

impl OrderCreated {
    /// Builds the event from an order that already has its store id.
    pub fn from_order(order: &Order, occurred_at: Timestamp) -> Self {
        Self {
            id: order.id(),
            number: order.number().to_string(),
            customer_id: order.customer_id().to_string(),
            occurred_at,
        }
    }
}

impl ExportedEvent for OrderCreated {
    fn aggregate_type(&self) -> &'static str {
        ORDER_AGGREGATE_TYPE
    }

    fn aggregate_id(&self) -> String {
        self.id.to_string()
    }

    fn event_type(&self) -> &'static str {
        ORDER_CREATED_EVENT_TYPE
    }

    fn payload(&self) -> JsonValue {
        serde_json::json!({
            "id": self.id.value(),
            "number": self.number,
            "customerId": self.customer_id,
        })
    }

    fn occurred_at(&self) -> Timestamp {
        self.occurred_at
    }
}
