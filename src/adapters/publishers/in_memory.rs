//! In-memory publisher for testing.
//!
//! Records every acknowledged event and can be scripted to fail, so relay
//! behavior under broker outages can be asserted deterministically.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::ports::{EventPublisher, PublishError};

/// An event the publisher acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedEvent {
    pub event_type: String,
    pub aggregate_id: String,
    pub payload: Vec<u8>,
}

impl PublishedEvent {
    /// Payload parsed as JSON, if it is JSON.
    pub fn payload_json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.payload).ok()
    }
}

/// In-memory publisher with failure scripting.
///
/// # Example
///
/// ```ignore
/// let publisher = Arc::new(InMemoryPublisher::new());
/// publisher.fail_next([PublishError::transient("broker down")]);
///
/// // first attempt fails, second one is recorded
/// assert_eq!(publisher.event_count(), 0);
/// ```
#[derive(Default)]
pub struct InMemoryPublisher {
    published: Mutex<Vec<PublishedEvent>>,
    scripted: Mutex<VecDeque<PublishError>>,
    rejected_aggregates: Mutex<HashMap<String, PublishError>>,
    attempts: AtomicUsize,
    ack_delay_ms: AtomicU64,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues errors returned by the next publish calls, in order.
    pub fn fail_next(&self, errors: impl IntoIterator<Item = PublishError>) {
        self.scripted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(errors);
    }

    /// Fails every publish for one aggregate until cleared.
    pub fn reject_aggregate(&self, aggregate_id: impl Into<String>, error: PublishError) {
        self.rejected_aggregates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(aggregate_id.into(), error);
    }

    /// Holds every publish this long before acknowledging it.
    pub fn delay_acks(&self, delay: Duration) {
        self.ack_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn clear_rejections(&self) {
        self.rejected_aggregates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    // === Test Helpers ===

    /// Acknowledged events in acknowledgement order.
    pub fn published_events(&self) -> Vec<PublishedEvent> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Acknowledged events for one aggregate.
    pub fn events_for_aggregate(&self, aggregate_id: &str) -> Vec<PublishedEvent> {
        self.published_events()
            .into_iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .collect()
    }

    pub fn event_count(&self) -> usize {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Publish calls so far, successful or not.
    pub fn attempt_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventPublisher for InMemoryPublisher {
    async fn publish(
        &self,
        event_type: &str,
        aggregate_id: &str,
        payload: &[u8],
    ) -> Result<(), PublishError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let delay_ms = self.ack_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        if let Some(error) = self
            .rejected_aggregates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(aggregate_id)
        {
            return Err(error.clone());
        }

        if let Some(error) = self
            .scripted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
        {
            return Err(error);
        }

        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(PublishedEvent {
                event_type: event_type.to_string(),
                aggregate_id: aggregate_id.to_string(),
                payload: payload.to_vec(),
            });
        Ok(())
    }
}
