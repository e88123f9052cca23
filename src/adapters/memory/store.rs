//! In-memory implementation of `TransactionalStore` and `OutboxStore`.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::foundation::{DomainError, ErrorCode, OrderId, OutboxRecordId, Timestamp};
use crate::domain::order::{NewOrder, Order};
use crate::domain::outbox::{OutboxRecord, OutboxStats, OutboxStatus};
use crate::ports::{OutboxStore, RelayPartition, StoreTransaction, TransactionalStore};

#[derive(Default)]
struct StoreState {
    orders: BTreeMap<OrderId, Order>,
    outbox: BTreeMap<OutboxRecordId, OutboxRecord>,
}

#[derive(Default)]
struct FailureInjection {
    order_insert: AtomicBool,
    outbox_insert: AtomicBool,
    commit: AtomicBool,
    mark_relayed: AtomicU32,
    select: AtomicU32,
}

impl FailureInjection {
    /// Consumes one scheduled failure from a countdown.
    fn take(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

type AggregateKey = (String, String);

struct Inner {
    state: RwLock<StoreState>,
    next_order_id: AtomicI64,
    failures: FailureInjection,
    aggregate_gates: Mutex<HashMap<AggregateKey, Arc<AsyncMutex<()>>>>,
}

impl Inner {
    fn read(&self) -> Result<RwLockReadGuard<'_, StoreState>, DomainError> {
        self.state
            .read()
            .map_err(|_| DomainError::new(ErrorCode::InternalError, "store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreState>, DomainError> {
        self.state
            .write()
            .map_err(|_| DomainError::new(ErrorCode::InternalError, "store lock poisoned"))
    }

    /// Gate serializing transactions that write one aggregate.
    fn aggregate_gate(&self, key: &AggregateKey) -> Result<Arc<AsyncMutex<()>>, DomainError> {
        let mut gates = self
            .aggregate_gates
            .lock()
            .map_err(|_| DomainError::new(ErrorCode::InternalError, "gate lock poisoned"))?;
        // Gates nobody holds or waits on
        gates.retain(|_, gate| Arc::strong_count(gate) > 1);
        Ok(gates.entry(key.clone()).or_default().clone())
    }
}

/// Shared in-memory store. Clones share state.
///
/// # Example
///
/// ```ignore
/// let store = InMemoryStore::new();
/// store.fail_outbox_inserts(true);
/// // create_order now fails and leaves neither an order nor a record behind
/// ```
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(StoreState::default()),
                next_order_id: AtomicI64::new(1),
                failures: FailureInjection::default(),
                aggregate_gates: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Starts order id generation at `next` (ids are handed out like a
    /// database sequence, so rolled back inserts leave gaps).
    pub fn with_next_order_id(self, next: i64) -> Self {
        self.inner.next_order_id.store(next, Ordering::SeqCst);
        self
    }

    // === Failure injection ===

    pub fn fail_order_inserts(&self, fail: bool) {
        self.inner.failures.order_insert.store(fail, Ordering::SeqCst);
    }

    pub fn fail_outbox_inserts(&self, fail: bool) {
        self.inner.failures.outbox_insert.store(fail, Ordering::SeqCst);
    }

    pub fn fail_commits(&self, fail: bool) {
        self.inner.failures.commit.store(fail, Ordering::SeqCst);
    }

    /// Makes the next `times` calls to `mark_relayed` fail.
    pub fn fail_next_mark_relayed(&self, times: u32) {
        self.inner.failures.mark_relayed.store(times, Ordering::SeqCst);
    }

    /// Makes the next `times` calls to `select_pending` fail.
    pub fn fail_next_selects(&self, times: u32) {
        self.inner.failures.select.store(times, Ordering::SeqCst);
    }

    // === Inspection ===

    /// Committed orders in id order.
    pub fn orders(&self) -> Vec<Order> {
        let state = self.inner.state.read().unwrap_or_else(PoisonError::into_inner);
        state.orders.values().cloned().collect()
    }

    /// Committed outbox records in id order, whatever their status.
    pub fn outbox_records(&self) -> Vec<OutboxRecord> {
        let state = self.inner.state.read().unwrap_or_else(PoisonError::into_inner);
        state.outbox.values().cloned().collect()
    }

    pub fn outbox_record(&self, id: OutboxRecordId) -> Option<OutboxRecord> {
        let state = self.inner.state.read().unwrap_or_else(PoisonError::into_inner);
        state.outbox.get(&id).cloned()
    }

    /// Inserts committed records directly, bypassing the write path.
    pub fn seed_outbox(&self, records: impl IntoIterator<Item = OutboxRecord>) {
        let mut state = self.inner.state.write().unwrap_or_else(PoisonError::into_inner);
        for record in records {
            state.outbox.insert(record.id, record);
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Buffers writes until commit. Dropping it discards the buffer and
/// releases its aggregate locks.
struct InMemoryTransaction {
    inner: Arc<Inner>,
    orders: Vec<Order>,
    records: Vec<OutboxRecord>,
    locks: HashMap<AggregateKey, OwnedMutexGuard<()>>,
    finished: bool,
}

impl InMemoryTransaction {
    fn ensure_open(&self) -> Result<(), DomainError> {
        if self.finished {
            return Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                "Transaction already finished",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn insert_order(&mut self, order: NewOrder) -> Result<Order, DomainError> {
        self.ensure_open()?;
        if self.inner.failures.order_insert.load(Ordering::SeqCst) {
            return Err(DomainError::database("Failed to insert order: injected failure"));
        }

        let id = OrderId::new(self.inner.next_order_id.fetch_add(1, Ordering::SeqCst));
        let order = Order::from_new(id, order, Timestamp::now());
        self.orders.push(order.clone());
        Ok(order)
    }

    async fn lock_aggregate(
        &mut self,
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> Result<(), DomainError> {
        self.ensure_open()?;
        let key = (aggregate_type.to_string(), aggregate_id.to_string());
        if self.locks.contains_key(&key) {
            return Ok(());
        }

        let gate = self.inner.aggregate_gate(&key)?;
        let guard = gate.lock_owned().await;
        self.locks.insert(key, guard);
        Ok(())
    }

    async fn insert_outbox_record(&mut self, record: &OutboxRecord) -> Result<(), DomainError> {
        self.ensure_open()?;
        if self.inner.failures.outbox_insert.load(Ordering::SeqCst) {
            return Err(DomainError::database(
                "Failed to insert outbox record: injected failure",
            ));
        }
        if self.records.iter().any(|r| r.id == record.id) {
            return Err(DomainError::database(format!(
                "Duplicate outbox record id: {}",
                record.id
            )));
        }

        self.records.push(record.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DomainError> {
        self.ensure_open()?;
        self.finished = true;
        // Released on return, after the writes are visible
        let _locks = std::mem::take(&mut self.locks);

        let orders = std::mem::take(&mut self.orders);
        let records = std::mem::take(&mut self.records);

        if self.inner.failures.commit.load(Ordering::SeqCst) {
            return Err(DomainError::database("Failed to commit transaction: injected failure"));
        }

        let mut state = self.inner.write()?;
        if let Some(dup) = records.iter().find(|r| state.outbox.contains_key(&r.id)) {
            return Err(DomainError::database(format!(
                "Duplicate outbox record id: {}",
                dup.id
            )));
        }
        for order in orders {
            state.orders.insert(order.id(), order);
        }
        for record in records {
            state.outbox.insert(record.id, record);
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DomainError> {
        self.ensure_open()?;
        self.finished = true;
        self.orders.clear();
        self.records.clear();
        self.locks.clear();
        Ok(())
    }
}

#[async_trait]
impl TransactionalStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, DomainError> {
        Ok(Box::new(InMemoryTransaction {
            inner: self.inner.clone(),
            orders: Vec::new(),
            records: Vec::new(),
            locks: HashMap::new(),
            finished: false,
        }))
    }
}

fn not_found(id: OutboxRecordId) -> DomainError {
    DomainError::new(
        ErrorCode::OutboxRecordNotFound,
        format!("Outbox record not found: {}", id),
    )
    .with_detail("record_id", id.to_string())
}

fn invalid_transition(record: &OutboxRecord, action: &str) -> DomainError {
    DomainError::new(
        ErrorCode::InvalidStateTransition,
        format!("Cannot {} outbox record {} in status {}", action, record.id, record.status),
    )
}

#[async_trait]
impl OutboxStore for InMemoryStore {
    async fn select_pending(
        &self,
        limit: u32,
        now: Timestamp,
        partition: RelayPartition,
    ) -> Result<Vec<OutboxRecord>, DomainError> {
        if FailureInjection::take(&self.inner.failures.select) {
            return Err(DomainError::database("Failed to select pending outbox: injected failure"));
        }

        let state = self.inner.read()?;
        let mut blocked: HashSet<(&str, &str)> = HashSet::new();
        let mut selected = Vec::new();

        for record in state.outbox.values() {
            if selected.len() >= limit as usize {
                break;
            }
            if !partition.contains(&record.aggregate_type, &record.aggregate_id) {
                continue;
            }
            let key = record.aggregate_key();
            if blocked.contains(&key) {
                continue;
            }
            if record.blocks_aggregate(now) {
                blocked.insert(key);
                continue;
            }
            if record.is_due(now) {
                selected.push(record.clone());
            }
        }

        Ok(selected)
    }

    async fn mark_relayed(&self, id: OutboxRecordId, at: Timestamp) -> Result<(), DomainError> {
        if FailureInjection::take(&self.inner.failures.mark_relayed) {
            return Err(DomainError::database("Failed to mark outbox record relayed: injected failure"));
        }

        let mut state = self.inner.write()?;
        let record = state.outbox.get_mut(&id).ok_or_else(|| not_found(id))?;
        match record.status {
            OutboxStatus::Pending => {
                record.status = OutboxStatus::Relayed;
                record.relayed_at = Some(at);
                record.next_attempt_at = None;
                Ok(())
            }
            OutboxStatus::Relayed => Ok(()),
            OutboxStatus::DeadLettered => Err(invalid_transition(record, "relay")),
        }
    }

    async fn record_failure(
        &self,
        id: OutboxRecordId,
        error: &str,
        next_attempt_at: Timestamp,
    ) -> Result<(), DomainError> {
        let mut state = self.inner.write()?;
        let record = state.outbox.get_mut(&id).ok_or_else(|| not_found(id))?;
        if !record.is_pending() {
            return Err(invalid_transition(record, "record a failure for"));
        }
        record.attempts += 1;
        record.last_error = Some(error.to_string());
        record.next_attempt_at = Some(next_attempt_at);
        Ok(())
    }

    async fn mark_dead_lettered(
        &self,
        id: OutboxRecordId,
        reason: &str,
    ) -> Result<(), DomainError> {
        let mut state = self.inner.write()?;
        let record = state.outbox.get_mut(&id).ok_or_else(|| not_found(id))?;
        if !record.is_pending() {
            return Err(invalid_transition(record, "dead-letter"));
        }
        record.status = OutboxStatus::DeadLettered;
        record.attempts += 1;
        record.last_error = Some(reason.to_string());
        record.next_attempt_at = None;
        Ok(())
    }

    async fn requeue(&self, id: OutboxRecordId) -> Result<(), DomainError> {
        let mut state = self.inner.write()?;
        let record = state.outbox.get_mut(&id).ok_or_else(|| not_found(id))?;
        if record.status != OutboxStatus::DeadLettered {
            return Err(invalid_transition(record, "requeue"));
        }
        record.status = OutboxStatus::Pending;
        record.attempts = 0;
        record.next_attempt_at = None;
        Ok(())
    }

    async fn purge_relayed(&self, older_than: Timestamp) -> Result<u64, DomainError> {
        let mut state = self.inner.write()?;
        let before = state.outbox.len();
        state.outbox.retain(|_, record| {
            !(record.status == OutboxStatus::Relayed
                && record.relayed_at.map_or(false, |at| at.is_before(&older_than)))
        });
        Ok((before - state.outbox.len()) as u64)
    }

    async fn stats(&self) -> Result<OutboxStats, DomainError> {
        let state = self.inner.read()?;
        let mut stats = OutboxStats::default();
        for record in state.outbox.values() {
            match record.status {
                OutboxStatus::Pending => {
                    stats.pending += 1;
                    if stats.oldest_pending_at.map_or(true, |t| record.created_at.is_before(&t)) {
                        stats.oldest_pending_at = Some(record.created_at);
                    }
                }
                OutboxStatus::Relayed => stats.relayed += 1,
                OutboxStatus::DeadLettered => stats.dead_lettered += 1,
            }
        }
        Ok(stats)
    }

    async fn list_unrelayed(&self, limit: u32) -> Result<Vec<OutboxRecord>, DomainError> {
        let state = self.inner.read()?;
        Ok(state
            .outbox
            .values()
            .filter(|r| r.status != OutboxStatus::Relayed)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}
