//! OutboxRecord - one row per emitted event.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{OutboxRecordId, Timestamp, ValidationError};

use super::ExportedEvent;

/// Persisted delivery status of an outbox record.
///
/// The in-flight "publishing" step is never persisted: a record being
/// published is still `Pending` in the store until the relay marks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    /// Written, not yet acknowledged by the publisher.
    Pending,
    /// Acknowledged by the publisher. Terminal.
    Relayed,
    /// Rejected permanently by the publisher. Kept for an operator and
    /// blocks later records of the same aggregate.
    DeadLettered,
}

impl OutboxStatus {
    /// Column value used by the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Relayed => "relayed",
            OutboxStatus::DeadLettered => "dead_lettered",
        }
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OutboxStatus::Pending),
            "relayed" => Ok(OutboxStatus::Relayed),
            "dead_lettered" => Ok(OutboxStatus::DeadLettered),
            other => Err(ValidationError::invalid_format(
                "status",
                format!("unknown outbox status '{}'", other),
            )),
        }
    }
}

/// An entry in the outbox table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub id: OutboxRecordId,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: JsonValue,
    /// Logical creation time of the event.
    pub created_at: Timestamp,
    pub status: OutboxStatus,
    /// Failed publish attempts so far.
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Earliest time the relay may try again after a failure.
    pub next_attempt_at: Option<Timestamp>,
    pub relayed_at: Option<Timestamp>,
}

impl OutboxRecord {
    /// Creates a new pending record with a freshly generated id.
    pub fn new(
        aggregate_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: JsonValue,
        occurred_at: Timestamp,
    ) -> Self {
        Self {
            id: OutboxRecordId::generate(),
            aggregate_type: aggregate_type.into(),
            aggregate_id: aggregate_id.into(),
            event_type: event_type.into(),
            payload,
            created_at: occurred_at,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            next_attempt_at: None,
            relayed_at: None,
        }
    }

    /// Creates a pending record from an exported event.
    pub fn from_event(event: &dyn ExportedEvent) -> Self {
        Self::new(
            event.aggregate_type(),
            event.aggregate_id(),
            event.event_type(),
            event.payload(),
            event.occurred_at(),
        )
    }

    /// Key that identifies the ordering unit of this record.
    pub fn aggregate_key(&self) -> (&str, &str) {
        (&self.aggregate_type, &self.aggregate_id)
    }

    /// Payload bytes handed to the publisher.
    pub fn payload_bytes(&self) -> Vec<u8> {
        // Serializing a `Value` cannot fail.
        serde_json::to_vec(&self.payload).unwrap_or_default()
    }

    pub fn is_pending(&self) -> bool {
        self.status == OutboxStatus::Pending
    }

    /// Whether the relay may pick this record up at `now`.
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.is_pending() && self.next_attempt_at.map_or(true, |at| !now.is_before(&at))
    }

    /// Whether this record holds back later records of its aggregate at `now`.
    pub fn blocks_aggregate(&self, now: Timestamp) -> bool {
        match self.status {
            OutboxStatus::Relayed => false,
            OutboxStatus::DeadLettered => true,
            OutboxStatus::Pending => !self.is_due(now),
        }
    }
}

/// Point-in-time counts for operational visibility.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutboxStats {
    pub pending: u64,
    pub dead_lettered: u64,
    pub relayed: u64,
    pub oldest_pending_at: Option<Timestamp>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn record() -> OutboxRecord {
        OutboxRecord::new("Order", "42", "OrderCreated", json!({"id": 42}), Timestamp::now())
    }

    #[test]
    fn new_record_is_pending_and_due() {
        let record = record();

        assert_eq!(record.status, OutboxStatus::Pending);
        assert_eq!(record.attempts, 0);
        assert!(record.is_due(Timestamp::now()));
        assert!(!record.blocks_aggregate(Timestamp::now()));
    }

    #[test]
    fn backing_off_record_is_not_due_and_blocks() {
        let now = Timestamp::now();
        let mut record = record();
        record.next_attempt_at = Some(now.plus(Duration::from_secs(5)));

        assert!(!record.is_due(now));
        assert!(record.blocks_aggregate(now));
        assert!(record.is_due(now.plus(Duration::from_secs(5))));
    }

    #[test]
    fn dead_lettered_record_blocks_and_relayed_does_not() {
        let now = Timestamp::now();
        let mut record = record();

        record.status = OutboxStatus::DeadLettered;
        assert!(record.blocks_aggregate(now));
        assert!(!record.is_due(now));

        record.status = OutboxStatus::Relayed;
        assert!(!record.blocks_aggregate(now));
    }

    #[test]
    fn status_round_trips_through_column_value() {
        for status in [
            OutboxStatus::Pending,
            OutboxStatus::Relayed,
            OutboxStatus::DeadLettered,
        ] {
            assert_eq!(status.as_str().parse::<OutboxStatus>().unwrap(), status);
        }
        assert!("publishing".parse::<OutboxStatus>().is_err());
    }

    #[test]
    fn payload_bytes_are_json() {
        let record = record();
        assert_eq!(record.payload_bytes(), br#"{"id":42}"#.to_vec());
    }
}
