//! Publisher that writes events to the log instead of a broker.

use async_trait::async_trait;

use crate::ports::{EventPublisher, PublishError};

/// Logs each event at info level and always acknowledges it.
///
/// Handy for local runs where no broker is available; the relay still
/// exercises the full select → publish → mark cycle.
#[derive(Debug, Clone, Default)]
pub struct LogPublisher {
    /// Include the payload in the log line.
    pub log_payload: bool,
}

impl LogPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_payload(mut self, log_payload: bool) -> Self {
        self.log_payload = log_payload;
        self
    }
}

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(
        &self,
        event_type: &str,
        aggregate_id: &str,
        payload: &[u8],
    ) -> Result<(), PublishError> {
        if self.log_payload {
            tracing::info!(
                event_type,
                aggregate_id,
                payload = %String::from_utf8_lossy(payload),
                "Event published"
            );
        } else {
            tracing::info!(event_type, aggregate_id, bytes = payload.len(), "Event published");
        }
        Ok(())
    }
}
