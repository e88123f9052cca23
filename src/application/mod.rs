//! Application layer - Commands, Queries, Handlers and the outbox relay.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! The write path (`CreateOrderHandler` + `OutboxWriter`) and the relay
//! (`OutboxRelay`) never call each other; they meet only at the outbox table.

pub mod handlers;
mod outbox_writer;
pub mod relay;

pub use handlers::{
    CreateOrderCommand, CreateOrderHandler, CreateOrderResult, GetOutboxStatsHandler,
    ListUnrelayedHandler, ListUnrelayedQuery, RequeueDeadLetterCommand, RequeueDeadLetterHandler,
};
pub use outbox_writer::OutboxWriter;
pub use relay::{BackoffPolicy, OutboxRelay, RelayConfig, RelayReport};
