//! Contract for events that leave the service through the outbox.

use serde_json::Value as JsonValue;

use crate::domain::foundation::Timestamp;

/// An event that can be exported through the outbox table.
///
/// The four routing fields map one to one onto the outbox columns
/// `aggregatetype`, `aggregateid`, `type` and `timestamp`; the payload
/// becomes the `payload` column.
pub trait ExportedEvent: Send + Sync {
    /// Type of the aggregate the event concerns (e.g. "Order").
    fn aggregate_type(&self) -> &'static str;

    /// Identifier of the aggregate instance, the unit of ordering.
    fn aggregate_id(&self) -> String;

    /// Semantic event name (e.g. "OrderCreated").
    fn event_type(&self) -> &'static str;

    /// Serialized event body.
    fn payload(&self) -> JsonValue;

    /// When the event happened, not when it is relayed.
    fn occurred_at(&self) -> Timestamp;
}
