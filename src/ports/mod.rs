//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! - `TransactionalStore` / `StoreTransaction` - atomic write path for
//!   orders and their outbox records
//! - `OutboxStore` - relay-side reads and status updates
//! - `EventPublisher` - downstream transport the relay delivers to

mod event_publisher;
mod outbox_store;
mod transaction;

pub use event_publisher::{EventPublisher, PublishError};
pub use outbox_store::{OutboxStore, RelayPartition};
pub use transaction::{StoreTransaction, TransactionalStore};
