//! PostgreSQL adapters - Database implementations for the store ports.
//!
//! - `PostgresStore` - orders + outbox table, transactional write path and
//!   relay-side operations

mod store;

pub use store::{PostgresStore, PostgresTransaction};

/// Applies the embedded schema migrations.
pub async fn run_migrations(pool: &sqlx::PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
