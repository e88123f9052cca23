//! PostgreSQL implementation of TransactionalStore and OutboxStore.
//!
//! Orders live in `orders`; events in `outboxevent`, one row per record.
//! Relayed rows keep their status until the retention purge deletes them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::domain::foundation::{DomainError, ErrorCode, OrderId, OutboxRecordId, Timestamp};
use crate::domain::order::{NewOrder, Order};
use crate::domain::outbox::{OutboxRecord, OutboxStats, OutboxStatus};
use crate::ports::{OutboxStore, RelayPartition, StoreTransaction, TransactionalStore};

const RECORD_COLUMNS: &str = "id, aggregatetype, aggregateid, type, timestamp, payload, \
     status, attempts, last_error, next_attempt_at, relayed_at";

/// PostgreSQL store for orders and their outbox.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgresStore.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn current_status(&self, id: OutboxRecordId) -> Result<Option<OutboxStatus>, DomainError> {
        let status = sqlx::query_scalar::<_, String>("SELECT status FROM outboxevent WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to fetch outbox record status", e))?;

        status
            .map(|s| parse_status(id, &s))
            .transpose()
    }

    /// Explains why an UPDATE guarded by status touched no row.
    async fn transition_error(&self, id: OutboxRecordId, action: &str) -> DomainError {
        match self.current_status(id).await {
            Ok(Some(status)) => invalid_transition(id, status, action),
            Ok(None) => not_found(id),
            Err(e) => e,
        }
    }
}

/// An open PostgreSQL transaction. Dropping it unfinished rolls back.
pub struct PostgresTransaction {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PostgresTransaction {
    fn active(&mut self) -> Result<&mut Transaction<'static, Postgres>, DomainError> {
        self.tx.as_mut().ok_or_else(|| {
            DomainError::new(
                ErrorCode::InvalidStateTransition,
                "Transaction already committed or rolled back",
            )
        })
    }

    fn take(&mut self) -> Result<Transaction<'static, Postgres>, DomainError> {
        self.tx.take().ok_or_else(|| {
            DomainError::new(
                ErrorCode::InvalidStateTransition,
                "Transaction already committed or rolled back",
            )
        })
    }
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn insert_order(&mut self, order: NewOrder) -> Result<Order, DomainError> {
        let tx = self.active()?;
        let created_at = Timestamp::now();

        let row = sqlx::query(
            r#"
            INSERT INTO orders (number, customer_id, created_at)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(order.number())
        .bind(order.customer_id())
        .bind(created_at.as_datetime())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| db_error("Failed to insert order", e))?;

        let id: i64 = row.get("id");
        Ok(Order::from_new(OrderId::new(id), order, created_at))
    }

    async fn lock_aggregate(
        &mut self,
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> Result<(), DomainError> {
        let tx = self.active()?;

        // Transaction-scoped and reentrant within the session
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1 || ':' || $2)::bigint)")
            .bind(aggregate_type)
            .bind(aggregate_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| db_error("Failed to lock aggregate", e))?;

        Ok(())
    }

    async fn insert_outbox_record(&mut self, record: &OutboxRecord) -> Result<(), DomainError> {
        let tx = self.active()?;

        sqlx::query(
            r#"
            INSERT INTO outboxevent (
                id, aggregatetype, aggregateid, type, timestamp, payload,
                status, attempts, last_error, next_attempt_at, relayed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(&record.aggregate_type)
        .bind(&record.aggregate_id)
        .bind(&record.event_type)
        .bind(record.created_at.as_datetime())
        .bind(&record.payload)
        .bind(record.status.as_str())
        .bind(record.attempts as i32)
        .bind(record.last_error.as_deref())
        .bind(record.next_attempt_at.map(|t| *t.as_datetime()))
        .bind(record.relayed_at.map(|t| *t.as_datetime()))
        .execute(&mut **tx)
        .await
        .map_err(|e| db_error("Failed to insert outbox record", e))?;

        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DomainError> {
        self.take()?
            .commit()
            .await
            .map_err(|e| db_error("Failed to commit transaction", e))
    }

    async fn rollback(&mut self) -> Result<(), DomainError> {
        self.take()?
            .rollback()
            .await
            .map_err(|e| db_error("Failed to roll back transaction", e))
    }
}

#[async_trait]
impl TransactionalStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, DomainError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        Ok(Box::new(PostgresTransaction { tx: Some(tx) }))
    }
}

#[async_trait]
impl OutboxStore for PostgresStore {
    async fn select_pending(
        &self,
        limit: u32,
        now: Timestamp,
        partition: RelayPartition,
    ) -> Result<Vec<OutboxRecord>, DomainError> {
        // A record waits while an earlier record of its aggregate is
        // dead-lettered or backing off.
        let sql = format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM outboxevent o
            WHERE o.status = 'pending'
              AND (o.next_attempt_at IS NULL OR o.next_attempt_at <= $1)
              AND ($3 <= 1 OR abs(hashtext(o.aggregatetype || ':' || o.aggregateid)::bigint) % $3 = $4)
              AND NOT EXISTS (
                  SELECT 1 FROM outboxevent e
                  WHERE e.aggregatetype = o.aggregatetype
                    AND e.aggregateid = o.aggregateid
                    AND e.id < o.id
                    AND (e.status = 'dead_lettered'
                         OR (e.status = 'pending' AND e.next_attempt_at > $1))
              )
            ORDER BY o.id
            LIMIT $2
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(now.as_datetime())
            .bind(i64::from(limit))
            .bind(i64::from(partition.count))
            .bind(i64::from(partition.index))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to select pending outbox records", e))?;

        rows.into_iter().map(row_to_record).collect()
    }

    async fn mark_relayed(&self, id: OutboxRecordId, at: Timestamp) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE outboxevent
            SET status = 'relayed', relayed_at = $2, next_attempt_at = NULL
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id.as_uuid())
        .bind(at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to mark outbox record relayed", e))?;

        if result.rows_affected() == 0 {
            return match self.current_status(id).await? {
                Some(OutboxStatus::Relayed) => Ok(()),
                Some(status) => Err(invalid_transition(id, status, "relay")),
                None => Err(not_found(id)),
            };
        }
        Ok(())
    }

    async fn record_failure(
        &self,
        id: OutboxRecordId,
        error: &str,
        next_attempt_at: Timestamp,
    ) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE outboxevent
            SET attempts = attempts + 1, last_error = $2, next_attempt_at = $3
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id.as_uuid())
        .bind(error)
        .bind(next_attempt_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to record outbox failure", e))?;

        if result.rows_affected() == 0 {
            return Err(self.transition_error(id, "record a failure for").await);
        }
        Ok(())
    }

    async fn mark_dead_lettered(
        &self,
        id: OutboxRecordId,
        reason: &str,
    ) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE outboxevent
            SET status = 'dead_lettered', attempts = attempts + 1,
                last_error = $2, next_attempt_at = NULL
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id.as_uuid())
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to dead-letter outbox record", e))?;

        if result.rows_affected() == 0 {
            return Err(self.transition_error(id, "dead-letter").await);
        }
        Ok(())
    }

    async fn requeue(&self, id: OutboxRecordId) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE outboxevent
            SET status = 'pending', attempts = 0, next_attempt_at = NULL
            WHERE id = $1 AND status = 'dead_lettered'
            "#,
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to requeue outbox record", e))?;

        if result.rows_affected() == 0 {
            return Err(self.transition_error(id, "requeue").await);
        }
        Ok(())
    }

    async fn purge_relayed(&self, older_than: Timestamp) -> Result<u64, DomainError> {
        let result = sqlx::query(
            "DELETE FROM outboxevent WHERE status = 'relayed' AND relayed_at < $1",
        )
        .bind(older_than.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to purge relayed outbox records", e))?;

        Ok(result.rows_affected())
    }

    async fn stats(&self) -> Result<OutboxStats, DomainError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'dead_lettered') AS dead_lettered,
                COUNT(*) FILTER (WHERE status = 'relayed') AS relayed,
                MIN(timestamp) FILTER (WHERE status = 'pending') AS oldest_pending_at
            FROM outboxevent
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to fetch outbox stats", e))?;

        let pending: i64 = row.get("pending");
        let dead_lettered: i64 = row.get("dead_lettered");
        let relayed: i64 = row.get("relayed");
        let oldest: Option<DateTime<Utc>> = row.get("oldest_pending_at");

        Ok(OutboxStats {
            pending: pending as u64,
            dead_lettered: dead_lettered as u64,
            relayed: relayed as u64,
            oldest_pending_at: oldest.map(Timestamp::from_datetime),
        })
    }

    async fn list_unrelayed(&self, limit: u32) -> Result<Vec<OutboxRecord>, DomainError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM outboxevent WHERE status <> 'relayed' ORDER BY id LIMIT $1"
        );

        let rows = sqlx::query(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to list unrelayed outbox records", e))?;

        rows.into_iter().map(row_to_record).collect()
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Helper functions
// ════════════════════════════════════════════════════════════════════════════════

fn db_error(context: &str, e: sqlx::Error) -> DomainError {
    DomainError::database(format!("{}: {}", context, e))
}

fn not_found(id: OutboxRecordId) -> DomainError {
    DomainError::new(
        ErrorCode::OutboxRecordNotFound,
        format!("Outbox record not found: {}", id),
    )
    .with_detail("record_id", id.to_string())
}

fn invalid_transition(id: OutboxRecordId, status: OutboxStatus, action: &str) -> DomainError {
    DomainError::new(
        ErrorCode::InvalidStateTransition,
        format!("Cannot {} outbox record {} in status {}", action, id, status),
    )
}

fn parse_status(id: OutboxRecordId, value: &str) -> Result<OutboxStatus, DomainError> {
    value.parse::<OutboxStatus>().map_err(|e| {
        DomainError::new(ErrorCode::DatabaseError, format!("Corrupt outbox row {}: {}", id, e))
    })
}

fn row_to_record(row: PgRow) -> Result<OutboxRecord, DomainError> {
    let id: Uuid = row.get("id");
    let status: String = row.get("status");
    let attempts: i32 = row.get("attempts");
    let created_at: DateTime<Utc> = row.get("timestamp");
    let next_attempt_at: Option<DateTime<Utc>> = row.get("next_attempt_at");
    let relayed_at: Option<DateTime<Utc>> = row.get("relayed_at");
    let payload: JsonValue = row.get("payload");

    let id = OutboxRecordId::from_uuid(id);
    let status = parse_status(id, &status)?;

    Ok(OutboxRecord {
        id,
        aggregate_type: row.get("aggregatetype"),
        aggregate_id: row.get("aggregateid"),
        event_type: row.get("type"),
        payload,
        created_at: Timestamp::from_datetime(created_at),
        status,
        attempts: attempts.max(0) as u32,
        last_error: row.get("last_error"),
        next_attempt_at: next_attempt_at.map(Timestamp::from_datetime),
        relayed_at: relayed_at.map(Timestamp::from_datetime),
    })
}
