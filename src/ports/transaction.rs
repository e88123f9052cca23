//! Transaction ports - the write path shared by the order workflow and the
//! outbox writer.
//!
//! The workflow opens one [`StoreTransaction`], inserts the order, hands the
//! same handle to the outbox writer and commits. Both rows become visible
//! together or not at all.
//!
//! Writers of one aggregate are serialized through
//! [`StoreTransaction::lock_aggregate`], so a record id generated under the
//! lock is larger than every id of that aggregate committed before it.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;
use crate::domain::order::{NewOrder, Order};
use crate::domain::outbox::OutboxRecord;

/// An open unit of work against the transactional store.
///
/// Implementations must discard every write made through the handle when
/// it is dropped without a successful [`commit`](StoreTransaction::commit).
/// After `commit` or `rollback` the handle is spent and further calls fail.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Inserts an order and returns it with its store-generated id.
    async fn insert_order(&mut self, order: NewOrder) -> Result<Order, DomainError>;

    /// Waits until no other open transaction holds the aggregate, then holds
    /// it until this transaction commits or rolls back.
    ///
    /// Calling it again for an aggregate already held is a no-op. Writers
    /// that hold several aggregates must take them in a consistent order.
    async fn lock_aggregate(
        &mut self,
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> Result<(), DomainError>;

    /// Appends an outbox record.
    async fn insert_outbox_record(&mut self, record: &OutboxRecord) -> Result<(), DomainError>;

    /// Makes every write durable and visible.
    async fn commit(&mut self) -> Result<(), DomainError>;

    /// Discards every write.
    async fn rollback(&mut self) -> Result<(), DomainError>;
}

/// A store that can open transactions.
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time check that both traits are object-safe
    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn TransactionalStore, _: &dyn StoreTransaction) {}
}
