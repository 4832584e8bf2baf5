//! Applying batch outcomes to the backing store and advancing the watermark.
//!
//! Order is fixed: storage commit first, checkpoint write second. A crash in
//! between leaves the checkpoint behind the database, which is harmless
//! because committed recipients are filtered out by the same-day guard.

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use mindfuel_core::outcome::sent_ids;
use mindfuel_core::{Checkpoint, DeliveryOutcome, Frequency, RecipientId};

use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::recipients::{RecipientStore, StorageError};

#[derive(Debug, Error)]
pub enum CommitError {
    /// The transaction was rolled back; neither storage nor checkpoint changed.
    #[error("feedback commit failed: {0}")]
    Storage(#[source] StorageError),

    /// Storage committed but the checkpoint was not advanced.
    #[error("checkpoint advance failed after commit: {0}")]
    Checkpoint(#[source] CheckpointError),
}

pub struct FeedbackCommitter<S, C> {
    store: S,
    checkpoints: C,
}

impl<S: RecipientStore, C: CheckpointStore> FeedbackCommitter<S, C> {
    pub fn new(store: S, checkpoints: C) -> Self {
        Self { store, checkpoints }
    }

    pub fn checkpoints(&self) -> &C {
        &self.checkpoints
    }

    /// Mark sent recipients, commit, then move the watermark to `batch_max_id`.
    ///
    /// Failed outcomes are left untouched so they stay eligible for a later
    /// run, but still count toward the watermark.
    #[instrument(
        skip(self, outcomes),
        fields(frequency = %frequency, batch_max_id = %batch_max_id, outcomes = outcomes.len()),
        err
    )]
    pub async fn commit(
        &self,
        frequency: Frequency,
        outcomes: &[DeliveryOutcome],
        batch_max_id: RecipientId,
        cycle_date: NaiveDate,
        sent_at: DateTime<Utc>,
    ) -> Result<Checkpoint, CommitError> {
        let ids = sent_ids(outcomes);
        let mut tx = self.store.begin().await.map_err(CommitError::Storage)?;

        let updated = if ids.is_empty() {
            0
        } else {
            match tx.mark_sent(&ids, sent_at).await {
                Ok(n) => n,
                Err(e) => {
                    if let Err(rollback) = tx.rollback().await {
                        warn!(error = %rollback, "rollback after failed update also failed");
                    }
                    error!(error = %e, "marking recipients sent failed, batch rolled back");
                    return Err(CommitError::Storage(e));
                }
            }
        };

        tx.commit().await.map_err(|e| {
            error!(error = %e, "batch commit failed, checkpoint not advanced");
            CommitError::Storage(e)
        })?;

        if updated != ids.len() as u64 {
            warn!(expected = ids.len(), updated, "sent-timestamp update touched an unexpected row count");
        }

        let checkpoint = Checkpoint::at(batch_max_id, cycle_date);
        self.checkpoints
            .save(frequency, &checkpoint)
            .await
            .map_err(CommitError::Checkpoint)?;

        info!(
            %frequency,
            sent = ids.len(),
            failed = outcomes.len() - ids.len(),
            last_processed_id = %batch_max_id,
            "batch committed"
        );
        Ok(checkpoint)
    }

    /// Reset the watermark for `frequency` after its cycle is exhausted.
    ///
    /// Idempotent: resetting an already reset checkpoint rewrites the same value.
    pub async fn reset_cycle(
        &self,
        frequency: Frequency,
        cycle_date: NaiveDate,
    ) -> Result<Checkpoint, CheckpointError> {
        let checkpoint = Checkpoint::initial(cycle_date);
        self.checkpoints.save(frequency, &checkpoint).await?;
        info!(%frequency, "cycle complete, checkpoint reset");
        Ok(checkpoint)
    }
}
