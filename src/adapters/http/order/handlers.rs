//! HTTP handlers for order and outbox endpoints.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::application::{
    CreateOrderCommand, CreateOrderHandler, GetOutboxStatsHandler, ListUnrelayedHandler,
    ListUnrelayedQuery, OutboxWriter, RequeueDeadLetterCommand, RequeueDeadLetterHandler,
};
use crate::domain::foundation::{DomainError, ErrorCode, OutboxRecordId};
use crate::domain::order::OrderError;
use crate::ports::{OutboxStore, TransactionalStore};

use super::dto::{
    CreateOrderRequest, ErrorResponse, OrderResponse, OutboxRecordResponse, OutboxStatsResponse,
    PendingQuery, RequeueResponse,
};

// ════════════════════════════════════════════════════════════════════════════
// Handler state
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct OrderApiState {
    create_order: Arc<CreateOrderHandler>,
    stats: Arc<GetOutboxStatsHandler>,
    list_unrelayed: Arc<ListUnrelayedHandler>,
    requeue: Arc<RequeueDeadLetterHandler>,
}

impl OrderApiState {
    pub fn new(
        create_order: Arc<CreateOrderHandler>,
        stats: Arc<GetOutboxStatsHandler>,
        list_unrelayed: Arc<ListUnrelayedHandler>,
        requeue: Arc<RequeueDeadLetterHandler>,
    ) -> Self {
        Self {
            create_order,
            stats,
            list_unrelayed,
            requeue,
        }
    }

    /// Wires every handler to one store implementing both ports.
    pub fn from_store<S>(store: S) -> Self
    where
        S: TransactionalStore + OutboxStore + 'static,
    {
        let store = Arc::new(store);
        let transactional: Arc<dyn TransactionalStore> = store.clone();
        let outbox: Arc<dyn OutboxStore> = store;

        Self::new(
            Arc::new(CreateOrderHandler::new(transactional, OutboxWriter::new())),
            Arc::new(GetOutboxStatsHandler::new(outbox.clone())),
            Arc::new(ListUnrelayedHandler::new(outbox.clone())),
            Arc::new(RequeueDeadLetterHandler::new(outbox)),
        )
    }
}

// ════════════════════════════════════════════════════════════════════════════
// HTTP handlers
// ════════════════════════════════════════════════════════════════════════════

/// POST /order - Create an order and its OrderCreated event
pub async fn create_order(
    State(state): State<OrderApiState>,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return handle_json_rejection(rejection),
    };

    let cmd = CreateOrderCommand {
        number: req.number,
        customer_id: req.customer_id,
    };

    match state.create_order.handle(cmd).await {
        Ok(result) => {
            let response = OrderResponse::new(&result.order, result.outbox_record_id);
            (StatusCode::CREATED, Json(response)).into_response()
        }
        Err(e) => handle_order_error(e),
    }
}

/// GET /outbox/stats - Outbox counters
pub async fn outbox_stats(State(state): State<OrderApiState>) -> Response {
    match state.stats.handle().await {
        Ok(stats) => {
            let response: OutboxStatsResponse = stats.into();
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => handle_domain_error(e),
    }
}

/// GET /outbox/pending - Records not yet relayed, oldest first
pub async fn list_pending(
    State(state): State<OrderApiState>,
    Query(params): Query<PendingQuery>,
) -> Response {
    let query = params
        .limit
        .map(|limit| ListUnrelayedQuery { limit })
        .unwrap_or_default();

    match state.list_unrelayed.handle(query).await {
        Ok(records) => {
            let response: Vec<OutboxRecordResponse> =
                records.into_iter().map(Into::into).collect();
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => handle_domain_error(e),
    }
}

/// POST /outbox/:id/requeue - Return a dead-lettered record to the relay
pub async fn requeue_record(
    State(state): State<OrderApiState>,
    Path(record_id): Path<String>,
) -> Response {
    let record_id = match record_id.parse::<OutboxRecordId>() {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::bad_request("Invalid outbox record ID")),
            )
                .into_response()
        }
    };

    match state.requeue.handle(RequeueDeadLetterCommand { record_id }).await {
        Ok(()) => {
            let response = RequeueResponse {
                record_id: record_id.to_string(),
                message: "Outbox record requeued".to_string(),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => handle_domain_error(e),
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Error handling
// ════════════════════════════════════════════════════════════════════════════

/// Malformed, mistyped or missing bodies share the 400 error shape.
fn handle_json_rejection(rejection: JsonRejection) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::bad_request(rejection.body_text())),
    )
        .into_response()
}

fn handle_order_error(error: OrderError) -> Response {
    match error {
        OrderError::ValidationFailed { field, message } => (
            StatusCode::BAD_REQUEST,
            Json(
                ErrorResponse::new(ErrorCode::ValidationFailed, format!(
                    "Validation failed for {}: {}",
                    field, message
                ))
                .with_details(serde_json::json!({ "field": field })),
            ),
        )
            .into_response(),
        OrderError::Persistence(msg) => {
            tracing::error!(error = %msg, "Order creation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(ErrorCode::DatabaseError, "Order could not be saved")),
            )
                .into_response()
        }
    }
}

fn handle_domain_error(error: DomainError) -> Response {
    let status = match error.code {
        ErrorCode::OutboxRecordNotFound => StatusCode::NOT_FOUND,
        ErrorCode::InvalidStateTransition => StatusCode::CONFLICT,
        ErrorCode::ValidationFailed => StatusCode::BAD_REQUEST,
        ErrorCode::DatabaseError | ErrorCode::InternalError => {
            tracing::error!(error = %error, "Outbox request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    (status, Json(ErrorResponse::new(error.code, error.message))).into_response()
}
