use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use mindfuel_core::{Recipient, RecipientId};

use super::{EligibilityQuery, RecipientStore, RecipientTransaction, StorageError};

#[derive(Debug, Default)]
struct Faults {
    fail_next_query: bool,
    fail_next_update: bool,
    fail_next_commit: bool,
}

#[derive(Debug, Default)]
struct State {
    rows: BTreeMap<RecipientId, Recipient>,
    faults: Faults,
    queries: Vec<EligibilityQuery>,
    commits: u64,
    rollbacks: u64,
}

/// In-memory subscriber store.
///
/// Intended for tests/dev. Transactions buffer their writes and apply them
/// only on commit; faults can be injected for the next query, update or commit.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecipientStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryRecipientStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recipients(recipients: impl IntoIterator<Item = Recipient>) -> Self {
        let store = Self::new();
        for r in recipients {
            store.insert(r);
        }
        store
    }

    pub fn insert(&self, recipient: Recipient) {
        self.state.lock().rows.insert(recipient.id, recipient);
    }

    pub fn get(&self, id: RecipientId) -> Option<Recipient> {
        self.state.lock().rows.get(&id).cloned()
    }

    pub fn all(&self) -> Vec<Recipient> {
        self.state.lock().rows.values().cloned().collect()
    }

    /// Every eligibility query served so far, in order.
    pub fn queries(&self) -> Vec<EligibilityQuery> {
        self.state.lock().queries.clone()
    }

    pub fn commits(&self) -> u64 {
        self.state.lock().commits
    }

    pub fn rollbacks(&self) -> u64 {
        self.state.lock().rollbacks
    }

    pub fn fail_next_query(&self) {
        self.state.lock().faults.fail_next_query = true;
    }

    pub fn fail_next_update(&self) {
        self.state.lock().faults.fail_next_update = true;
    }

    pub fn fail_next_commit(&self) {
        self.state.lock().faults.fail_next_commit = true;
    }
}

#[async_trait::async_trait]
impl RecipientStore for InMemoryRecipientStore {
    async fn query_eligible(&self, query: EligibilityQuery) -> Result<Vec<Recipient>, StorageError> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.faults.fail_next_query) {
            return Err(StorageError::Connection("injected query failure".to_string()));
        }
        state.queries.push(query);

        // BTreeMap iteration is ascending by id.
        Ok(state
            .rows
            .values()
            .filter(|r| r.is_eligible(query.frequency, query.after_id, query.day_start))
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn begin(&self) -> Result<Box<dyn RecipientTransaction>, StorageError> {
        Ok(Box::new(InMemoryTransaction {
            state: self.state.clone(),
            pending: Vec::new(),
        }))
    }
}

struct InMemoryTransaction {
    state: Arc<Mutex<State>>,
    pending: Vec<(RecipientId, DateTime<Utc>)>,
}

#[async_trait::async_trait]
impl RecipientTransaction for InMemoryTransaction {
    async fn mark_sent(
        &mut self,
        ids: &[RecipientId],
        sent_at: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.faults.fail_next_update) {
            return Err(StorageError::Query("injected update failure".to_string()));
        }
        let mut touched = 0;
        for id in ids {
            if state.rows.contains_key(id) {
                self.pending.push((*id, sent_at));
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.faults.fail_next_commit) {
            state.rollbacks += 1;
            return Err(StorageError::Commit("injected commit failure".to_string()));
        }
        for (id, sent_at) in &self.pending {
            if let Some(row) = state.rows.get_mut(id) {
                row.last_sent_at = Some(*sent_at);
            }
        }
        state.commits += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        self.state.lock().rollbacks += 1;
        Ok(())
    }
}
