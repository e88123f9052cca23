//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `postgres` - durable store for orders and the outbox table
//! - `memory` - in-memory store for tests and local runs
//! - `publishers` - EventPublisher implementations (log, Redis Streams, in-memory)
//! - `http` - axum routes for order creation and outbox diagnostics

pub mod http;
pub mod memory;
pub mod postgres;
pub mod publishers;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use publishers::{InMemoryPublisher, LogPublisher, RedisStreamPublisher};
