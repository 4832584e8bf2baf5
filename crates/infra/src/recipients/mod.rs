//! Backing store boundary for subscribers.
//!
//! The store answers one query shape (the eligibility predicate, ascending by
//! id, bounded) and exposes explicit transactions for the feedback write.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use mindfuel_core::{Frequency, Recipient, RecipientId};

pub use in_memory::InMemoryRecipientStore;
pub use postgres::PostgresRecipientStore;

/// Parameters of one eligibility query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EligibilityQuery {
    pub frequency: Frequency,
    /// Exclusive lower bound on recipient id (the resumption watermark).
    pub after_id: RecipientId,
    pub limit: usize,
    /// Recipients sent to at or after this instant are excluded.
    pub day_start: DateTime<Utc>,
}

/// Backing store failure. Always fatal to the current run.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage connection failed: {0}")]
    Connection(String),

    #[error("storage query failed: {0}")]
    Query(String),

    #[error("storage commit failed: {0}")]
    Commit(String),

    #[error("failed to decode recipient row: {0}")]
    Decode(String),
}

/// Subscriber store.
#[async_trait::async_trait]
pub trait RecipientStore: Send + Sync {
    /// Eligible recipients for `query`, ascending by id, at most `query.limit`.
    ///
    /// An empty result means the frequency is exhausted past `after_id`.
    async fn query_eligible(&self, query: EligibilityQuery) -> Result<Vec<Recipient>, StorageError>;

    /// Open a transaction for the feedback write.
    async fn begin(&self) -> Result<Box<dyn RecipientTransaction>, StorageError>;
}

/// A storage transaction. Dropping it without `commit` discards its writes.
#[async_trait::async_trait]
pub trait RecipientTransaction: Send {
    /// Set `last_sent_at = sent_at` for `ids`. Returns the number of rows touched.
    async fn mark_sent(
        &mut self,
        ids: &[RecipientId],
        sent_at: DateTime<Utc>,
    ) -> Result<u64, StorageError>;

    async fn commit(self: Box<Self>) -> Result<(), StorageError>;

    async fn rollback(self: Box<Self>) -> Result<(), StorageError>;
}

#[async_trait::async_trait]
impl<S> RecipientStore for Arc<S>
where
    S: RecipientStore + ?Sized,
{
    async fn query_eligible(&self, query: EligibilityQuery) -> Result<Vec<Recipient>, StorageError> {
        (**self).query_eligible(query).await
    }

    async fn begin(&self) -> Result<Box<dyn RecipientTransaction>, StorageError> {
        (**self).begin().await
    }
}
