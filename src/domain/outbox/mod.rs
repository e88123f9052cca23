//! Outbox domain - the durable representation of events awaiting relay.

mod event;
mod record;

pub use event::ExportedEvent;
pub use record::{OutboxRecord, OutboxStats, OutboxStatus};
