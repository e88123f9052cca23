//! HTTP routes for order and outbox endpoints.

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{create_order, list_pending, outbox_stats, requeue_record, OrderApiState};

/// Creates the router with all endpoints.
pub fn order_router(state: OrderApiState) -> Router {
    Router::new()
        .route("/order", post(create_order))
        .route("/outbox/stats", get(outbox_stats))
        .route("/outbox/pending", get(list_pending))
        .route("/outbox/:id/requeue", post(requeue_record))
        .with_state(state)
}
