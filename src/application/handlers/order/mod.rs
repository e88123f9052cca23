//! Order command handlers.

mod create_order;

pub use create_order::{CreateOrderCommand, CreateOrderHandler, CreateOrderResult};
