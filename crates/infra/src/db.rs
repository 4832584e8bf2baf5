//! Connection pool construction and schema bootstrap.

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::instrument;

use crate::recipients::StorageError;
use crate::recipients::postgres::map_sqlx_error;

const SCHEMA: &str = include_str!("../schema.sql");

/// Open a pool. Connections are pinged before use so a stale connection is
/// replaced instead of failing the first query.
#[instrument(skip(url), err)]
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, StorageError> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .test_before_acquire(true)
        .connect(url)
        .await
        .map_err(|e| match map_sqlx_error("connect", e) {
            StorageError::Query(msg) => StorageError::Connection(msg),
            other => other,
        })
}

/// Create tables and indexes if they do not exist.
#[instrument(skip(pool), err)]
pub async fn apply_schema(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("apply_schema", e))?;
    Ok(())
}
