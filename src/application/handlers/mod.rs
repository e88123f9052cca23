//! Application handlers.
//!
//! Command and query handlers that orchestrate domain operations.

pub mod order;
pub mod outbox;

pub use order::{CreateOrderCommand, CreateOrderHandler, CreateOrderResult};
pub use outbox::{
    GetOutboxStatsHandler, ListUnrelayedHandler, ListUnrelayedQuery, RequeueDeadLetterCommand,
    RequeueDeadLetterHandler,
};
