//! HTTP DTOs for order and outbox endpoints.
//!
//! These types decouple the HTTP API from domain types, allowing independent evolution.

use serde::{Deserialize, Serialize};

use crate::domain::order::Order;
use crate::domain::outbox::{OutboxRecord, OutboxStats};

// ════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════

/// Request to create an order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub number: String,
    pub customer_id: String,
}

/// Query parameters for listing unrelayed records.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PendingQuery {
    #[serde(default)]
    pub limit: Option<u32>,
}

// ════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════

/// A created order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: i64,
    pub number: String,
    pub customer_id: String,
    /// Outbox record written with the order.
    pub event_id: String,
}

impl OrderResponse {
    pub fn new(order: &Order, event_id: impl ToString) -> Self {
        Self {
            id: order.id().value(),
            number: order.number().to_string(),
            customer_id: order.customer_id().to_string(),
            event_id: event_id.to_string(),
        }
    }
}

/// Outbox counters.
#[derive(Debug, Clone, Serialize)]
pub struct OutboxStatsResponse {
    pub pending: u64,
    pub dead_lettered: u64,
    pub relayed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_pending_at: Option<String>,
}

impl From<OutboxStats> for OutboxStatsResponse {
    fn from(stats: OutboxStats) -> Self {
        Self {
            pending: stats.pending,
            dead_lettered: stats.dead_lettered,
            relayed: stats.relayed,
            oldest_pending_at: stats.oldest_pending_at.map(|t| t.as_datetime().to_rfc3339()),
        }
    }
}

/// An outbox record that has not been relayed yet.
#[derive(Debug, Clone, Serialize)]
pub struct OutboxRecordResponse {
    pub id: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub status: String,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<String>,
    pub created_at: String,
    pub payload: serde_json::Value,
}

impl From<OutboxRecord> for OutboxRecordResponse {
    fn from(record: OutboxRecord) -> Self {
        Self {
            id: record.id.to_string(),
            aggregate_type: record.aggregate_type,
            aggregate_id: record.aggregate_id,
            event_type: record.event_type,
            status: record.status.as_str().to_string(),
            attempts: record.attempts,
            last_error: record.last_error,
            next_attempt_at: record.next_attempt_at.map(|t| t.as_datetime().to_rfc3339()),
            created_at: record.created_at.as_datetime().to_rfc3339(),
            payload: record.payload,
        }
    }
}

/// Response for a requeued record.
#[derive(Debug, Clone, Serialize)]
pub struct RequeueResponse {
    pub record_id: String,
    pub message: String,
}

/// Standard error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(code: impl ToString, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{OrderId, Timestamp};
    use crate::domain::order::NewOrder;
    use serde_json::json;

    #[test]
    fn create_order_request_uses_camel_case() {
        let req: CreateOrderRequest =
            serde_json::from_value(json!({"number": "A-100", "customerId": "C-1"})).unwrap();

        assert_eq!(req.number, "A-100");
        assert_eq!(req.customer_id, "C-1");
    }

    #[test]
    fn order_response_serializes_like_the_event_payload() {
        let order = Order::from_new(
            OrderId::new(42),
            NewOrder::new("A-100", "C-1").unwrap(),
            Timestamp::now(),
        );

        let value = serde_json::to_value(OrderResponse::new(&order, "evt")).unwrap();

        assert_eq!(value["id"], 42);
        assert_eq!(value["number"], "A-100");
        assert_eq!(value["customerId"], "C-1");
        assert_eq!(value["eventId"], "evt");
    }

    #[test]
    fn stats_without_pending_omit_oldest() {
        let value = serde_json::to_value(OutboxStatsResponse::from(OutboxStats::default())).unwrap();

        assert_eq!(value["pending"], 0);
        assert!(value.get("oldest_pending_at").is_none());
    }
}
