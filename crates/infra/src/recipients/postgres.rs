//! Postgres-backed subscriber store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | StorageError |
//! |------------|--------------|
//! | Database (any code) | `Query` |
//! | PoolClosed / PoolTimedOut / Io / Tls | `Connection` |
//! | ColumnDecode / Decode / ColumnNotFound | `Decode` |
//! | Other | `Query` |
//!
//! Failures while committing are reported as `Commit` regardless of cause.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use mindfuel_core::{Frequency, Recipient, RecipientId, SubscriptionStatus};

use super::{EligibilityQuery, RecipientStore, RecipientTransaction, StorageError};

/// Subscriber store over the `users` table.
#[derive(Debug, Clone)]
pub struct PostgresRecipientStore {
    pool: Arc<PgPool>,
}

impl PostgresRecipientStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait::async_trait]
impl RecipientStore for PostgresRecipientStore {
    #[instrument(
        skip(self),
        fields(
            frequency = %query.frequency,
            after_id = %query.after_id,
            limit = query.limit
        ),
        err
    )]
    async fn query_eligible(&self, query: EligibilityQuery) -> Result<Vec<Recipient>, StorageError> {
        let limit = i64::try_from(query.limit)
            .map_err(|_| StorageError::Query(format!("batch limit {} out of range", query.limit)))?;

        let rows = sqlx::query(
            r#"
            SELECT
                user_id,
                first_name,
                email_address,
                subscription_status,
                email_frequency,
                last_email_sent_at
            FROM users
            WHERE subscription_status = 'active'
                AND email_frequency = $1
                AND user_id > $2
                AND (last_email_sent_at IS NULL OR last_email_sent_at < $3)
            ORDER BY user_id ASC
            LIMIT $4
            "#,
        )
        .bind(query.frequency.as_str())
        .bind(query.after_id.get())
        .bind(query.day_start)
        .bind(limit)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("query_eligible", e))?;

        rows.iter().map(decode_recipient).collect()
    }

    #[instrument(skip(self), err)]
    async fn begin(&self) -> Result<Box<dyn RecipientTransaction>, StorageError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(Box::new(PostgresRecipientTransaction { tx }))
    }
}

struct PostgresRecipientTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait::async_trait]
impl RecipientTransaction for PostgresRecipientTransaction {
    #[instrument(skip(self, ids), fields(id_count = ids.len()), err)]
    async fn mark_sent(
        &mut self,
        ids: &[RecipientId],
        sent_at: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let ids: Vec<i64> = ids.iter().map(|id| id.get()).collect();
        let result = sqlx::query(
            r#"
            UPDATE users
            SET last_email_sent_at = $1
            WHERE user_id = ANY($2)
            "#,
        )
        .bind(sent_at)
        .bind(&ids)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("mark_sent", e))?;

        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        self.tx
            .commit()
            .await
            .map_err(|e| StorageError::Commit(format!("commit failed: {e}")))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

fn decode_recipient(row: &sqlx::postgres::PgRow) -> Result<Recipient, StorageError> {
    let decode = |e: sqlx::Error| map_sqlx_error("decode_recipient", e);

    let status: String = row.try_get("subscription_status").map_err(decode)?;
    let frequency: String = row.try_get("email_frequency").map_err(decode)?;
    Ok(Recipient {
        id: RecipientId::new(row.try_get("user_id").map_err(decode)?),
        name: row
            .try_get::<Option<String>, _>("first_name")
            .map_err(decode)?
            .unwrap_or_default(),
        address: row.try_get("email_address").map_err(decode)?,
        status: SubscriptionStatus::from_str(&status)
            .map_err(|e| StorageError::Decode(e.to_string()))?,
        frequency: Frequency::from_str(&frequency)
            .map_err(|e| StorageError::Decode(e.to_string()))?,
        last_sent_at: row.try_get("last_email_sent_at").map_err(decode)?,
    })
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StorageError {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.into_owned()).unwrap_or_default();
            StorageError::Query(format!(
                "database error in {operation} ({code}): {}",
                db_err.message()
            ))
        }
        sqlx::Error::PoolClosed => {
            StorageError::Connection(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::PoolTimedOut => {
            StorageError::Connection(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::Io(e) => StorageError::Connection(format!("io error in {operation}: {e}")),
        sqlx::Error::Tls(e) => StorageError::Connection(format!("tls error in {operation}: {e}")),
        sqlx::Error::ColumnNotFound(col) => {
            StorageError::Decode(format!("column {col} missing in {operation}"))
        }
        e @ (sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_)) => {
            StorageError::Decode(format!("{operation}: {e}"))
        }
        other => StorageError::Query(format!("{operation}: {other}")),
    }
}
