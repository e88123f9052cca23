//! Outbox relay - delivers committed outbox records to the publisher.

mod backoff;
mod outbox_relay;

pub use backoff::BackoffPolicy;
pub use outbox_relay::{OutboxRelay, RelayConfig, RelayReport};
