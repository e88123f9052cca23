//! Outbox diagnostic handlers.
//!
//! Read-only inspection plus the operator requeue. None of these take part
//! in the write path or the relay's correctness.

mod get_outbox_stats;
mod list_unrelayed;
mod requeue_dead_letter;

pub use get_outbox_stats::GetOutboxStatsHandler;
pub use list_unrelayed::{ListUnrelayedHandler, ListUnrelayedQuery, MAX_LIST_LIMIT};
pub use requeue_dead_letter::{RequeueDeadLetterCommand, RequeueDeadLetterHandler};
