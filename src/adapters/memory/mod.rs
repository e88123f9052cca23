//! In-memory store adapter.
//!
//! Implements the transactional write path and the relay-side outbox port
//! over process memory. Used by tests and local runs; it offers failure
//! injection so atomicity and crash behavior can be exercised without a
//! database.

mod store;

pub use store::InMemoryStore;
