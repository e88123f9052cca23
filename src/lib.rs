//! Order Outbox - order service with a transactional outbox.
//!
//! Creating an order writes the order row and an `OrderCreated` outbox
//! record in one transaction. A background relay publishes committed
//! records at least once, in order per aggregate, and marks them relayed.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
