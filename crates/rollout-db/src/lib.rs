//! PostgreSQL persistence for the deployment orchestrator.
//!
//! Repository modules map 1:1 onto the persisted relations: deployment
//! executions (with their stages and per-node results), the durable job
//! queue, the message bus, approval requests, the idempotency store, and
//! distributed locks.

pub(crate) mod codec;
pub mod error;
pub mod repo;

pub use error::{DbError, DbResult};
pub use repo::*;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Create a new database connection pool.
pub async fn create_pool(database_url: &str) -> DbResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> DbResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
