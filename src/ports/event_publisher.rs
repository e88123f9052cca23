//! EventPublisher port - the sink the outbox relay delivers to.
//!
//! This port is where transport-specific code lives (broker clients, log
//! sinks). The relay treats every implementation the same way.

use async_trait::async_trait;
use thiserror::Error;

/// Why a publish attempt did not get acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    /// The transport is temporarily unavailable. The record stays pending
    /// and is retried with backoff.
    #[error("transient publish failure: {0}")]
    Transient(String),

    /// The event can never be published as is. The record is flagged for
    /// an operator instead of being dropped.
    #[error("permanent publish failure: {0}")]
    Permanent(String),
}

impl PublishError {
    pub fn transient(message: impl Into<String>) -> Self {
        PublishError::Transient(message.into())
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        PublishError::Permanent(message.into())
    }
}

/// Port for publishing relayed events.
///
/// Returning `Ok(())` means the transport durably accepted the event; the
/// relay marks the record relayed only after that. Delivery is
/// at-least-once, so consumers must tolerate duplicates.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        event_type: &str,
        aggregate_id: &str,
        payload: &[u8],
    ) -> Result<(), PublishError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time check that trait is object-safe
    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn EventPublisher) {}

    #[test]
    fn publish_errors_name_their_kind() {
        assert_eq!(
            PublishError::permanent("bad payload").to_string(),
            "permanent publish failure: bad payload"
        );
        assert_eq!(
            PublishError::transient("timeout").to_string(),
            "transient publish failure: timeout"
        );
    }
}
