//! Order domain - the business entity whose creation is exported as an event.

mod aggregate;
mod errors;
mod events;

pub use aggregate::{NewOrder, Order, MAX_FIELD_LEN};
pub use errors::OrderError;
pub use events::{OrderCreated, ORDER_AGGREGATE_TYPE, ORDER_CREATED_EVENT_TYPE};
