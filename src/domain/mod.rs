//! Domain layer - entities, events and value objects.

pub mod foundation;
pub mod order;
pub mod outbox;
