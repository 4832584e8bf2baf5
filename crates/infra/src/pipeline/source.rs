//! Streaming eligible recipients in bounded, id-ordered batches.

use chrono::{DateTime, Utc};
use tracing::debug;

use mindfuel_core::{Batch, Frequency, RecipientId};

use crate::recipients::{EligibilityQuery, RecipientStore, StorageError};

/// Reads eligible batches from the backing store. Holds no state of its own;
/// resumption is driven entirely by `after_id`.
pub struct RecipientSource<S> {
    store: S,
}

impl<S: RecipientStore> RecipientSource<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The next batch after `after_id`. Empty means the frequency is exhausted.
    pub async fn next_batch(
        &self,
        frequency: Frequency,
        after_id: RecipientId,
        limit: usize,
        day_start: DateTime<Utc>,
    ) -> Result<Batch, StorageError> {
        let recipients = self
            .store
            .query_eligible(EligibilityQuery {
                frequency,
                after_id,
                limit,
                day_start,
            })
            .await?;
        debug!(%frequency, %after_id, fetched = recipients.len(), "fetched batch");
        Ok(Batch::new(frequency, recipients))
    }

    /// A cursor over `frequency` starting after `after_id`.
    pub fn cursor(
        &self,
        frequency: Frequency,
        after_id: RecipientId,
        limit: usize,
        day_start: DateTime<Utc>,
    ) -> BatchCursor<'_, S> {
        BatchCursor {
            source: self,
            frequency,
            position: after_id,
            limit: limit.max(1),
            day_start,
            exhausted: false,
        }
    }
}

/// Stateful cursor over one frequency's batches.
///
/// `next` returns `Ok(None)` once the store yields an empty batch; after that
/// `has_next` is false. The cursor position only moves when the caller
/// confirms the batch with [`BatchCursor::advance`], so a batch that fails
/// to commit is fetched again by a fresh cursor from the same watermark.
pub struct BatchCursor<'a, S> {
    source: &'a RecipientSource<S>,
    frequency: Frequency,
    position: RecipientId,
    limit: usize,
    day_start: DateTime<Utc>,
    exhausted: bool,
}

impl<S: RecipientStore> BatchCursor<'_, S> {
    pub fn has_next(&self) -> bool {
        !self.exhausted
    }

    pub fn position(&self) -> RecipientId {
        self.position
    }

    pub async fn next(&mut self) -> Result<Option<Batch>, StorageError> {
        if self.exhausted {
            return Ok(None);
        }
        let batch = self
            .source
            .next_batch(self.frequency, self.position, self.limit, self.day_start)
            .await?;
        if batch.is_empty() {
            self.exhausted = true;
            return Ok(None);
        }
        Ok(Some(batch))
    }

    /// Move the position past a processed batch.
    pub fn advance(&mut self, to: RecipientId) {
        if to > self.position {
            self.position = to;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::start_of_day;
    use crate::recipients::InMemoryRecipientStore;
    use chrono::NaiveDate;
    use mindfuel_core::{Recipient, SubscriptionStatus};

    fn recipients(ids: &[i64]) -> Vec<Recipient> {
        ids.iter()
            .map(|&id| Recipient {
                id: RecipientId::new(id),
                name: format!("r{id}"),
                address: format!("r{id}@example.com"),
                status: SubscriptionStatus::Active,
                frequency: Frequency::Daily,
                last_sent_at: None,
            })
            .collect()
    }

    fn day_start() -> DateTime<Utc> {
        start_of_day(NaiveDate::from_ymd_opt(2025, 3, 4).unwrap())
    }

    #[tokio::test]
    async fn cursor_walks_batches_until_exhausted() {
        let source = RecipientSource::new(InMemoryRecipientStore::with_recipients(recipients(&[
            3, 9, 12, 20, 21,
        ])));
        let mut cursor = source.cursor(Frequency::Daily, RecipientId::ZERO, 2, day_start());

        let mut sizes = Vec::new();
        while cursor.has_next() {
            let Some(batch) = cursor.next().await.unwrap() else {
                break;
            };
            sizes.push(batch.len());
            cursor.advance(batch.max_id().unwrap());
        }

        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(cursor.position(), RecipientId::new(21));
        assert!(!cursor.has_next());
        assert_eq!(source.store().queries().len(), 4);
    }

    #[tokio::test]
    async fn unconfirmed_batch_is_refetched() {
        let source =
            RecipientSource::new(InMemoryRecipientStore::with_recipients(recipients(&[1, 2, 3])));
        let mut cursor = source.cursor(Frequency::Daily, RecipientId::ZERO, 2, day_start());

        let first = cursor.next().await.unwrap().unwrap();
        let again = cursor.next().await.unwrap().unwrap();
        assert_eq!(first.ids(), again.ids());
    }
}
