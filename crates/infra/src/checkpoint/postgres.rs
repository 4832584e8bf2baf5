use std::sync::Arc;

use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use tracing::instrument;

use mindfuel_core::{Checkpoint, Frequency, RecipientId};

use super::{CheckpointError, CheckpointStore};

/// Checkpoints in the `delivery_checkpoints` table, keyed by frequency.
#[derive(Debug, Clone)]
pub struct PostgresCheckpointStore {
    pool: Arc<PgPool>,
}

impl PostgresCheckpointStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait::async_trait]
impl CheckpointStore for PostgresCheckpointStore {
    #[instrument(skip(self), fields(frequency = %frequency), err)]
    async fn load(&self, frequency: Frequency) -> Result<Option<Checkpoint>, CheckpointError> {
        let row = sqlx::query(
            r#"
            SELECT last_processed_id, cycle_date
            FROM delivery_checkpoints
            WHERE frequency = $1
            "#,
        )
        .bind(frequency.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| storage_error("load_checkpoint", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let id: i64 = row
            .try_get("last_processed_id")
            .map_err(|e| storage_error("decode_checkpoint", e))?;
        let cycle_date: NaiveDate = row
            .try_get("cycle_date")
            .map_err(|e| storage_error("decode_checkpoint", e))?;
        Ok(Some(Checkpoint::at(RecipientId::new(id), cycle_date)))
    }

    #[instrument(
        skip(self, checkpoint),
        fields(frequency = %frequency, last_processed_id = %checkpoint.last_processed_id),
        err
    )]
    async fn save(
        &self,
        frequency: Frequency,
        checkpoint: &Checkpoint,
    ) -> Result<(), CheckpointError> {
        sqlx::query(
            r#"
            INSERT INTO delivery_checkpoints (frequency, last_processed_id, cycle_date)
            VALUES ($1, $2, $3)
            ON CONFLICT (frequency)
            DO UPDATE SET
                last_processed_id = EXCLUDED.last_processed_id,
                cycle_date = EXCLUDED.cycle_date,
                updated_at = NOW()
            "#,
        )
        .bind(frequency.as_str())
        .bind(checkpoint.last_processed_id.get())
        .bind(checkpoint.cycle_date)
        .execute(&*self.pool)
        .await
        .map_err(|e| storage_error("save_checkpoint", e))?;
        Ok(())
    }
}

fn storage_error(operation: &str, err: sqlx::Error) -> CheckpointError {
    CheckpointError::Storage(format!("{operation}: {err}"))
}
