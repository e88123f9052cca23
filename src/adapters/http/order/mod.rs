//! HTTP adapter for order creation and outbox diagnostics.

mod dto;
mod handlers;
mod routes;

pub use dto::{
    CreateOrderRequest, ErrorResponse, OrderResponse, OutboxRecordResponse, OutboxStatsResponse,
    PendingQuery, RequeueResponse,
};
pub use handlers::OrderApiState;
pub use routes::order_router;
