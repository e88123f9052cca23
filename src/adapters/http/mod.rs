//! HTTP adapters - REST API implementations.
//!
//! - `order` - order creation and outbox diagnostics

pub mod order;

// Re-export key types for convenience
pub use order::{order_router, OrderApiState};
