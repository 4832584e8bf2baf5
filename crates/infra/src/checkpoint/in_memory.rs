use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use mindfuel_core::{Checkpoint, Frequency};

use super::{CheckpointError, CheckpointStore};

#[derive(Debug, Default)]
struct State {
    current: HashMap<Frequency, Checkpoint>,
    history: Vec<(Frequency, Checkpoint)>,
    fail_next_save: bool,
}

/// In-memory checkpoint store.
///
/// Intended for tests/dev. Every successful save is appended to a history so
/// tests can assert the exact watermark sequence.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, frequency: Frequency, checkpoint: Checkpoint) {
        self.state.lock().current.insert(frequency, checkpoint);
    }

    pub fn current(&self, frequency: Frequency) -> Option<Checkpoint> {
        self.state.lock().current.get(&frequency).copied()
    }

    /// Saved checkpoints for `frequency`, oldest first.
    pub fn history(&self, frequency: Frequency) -> Vec<Checkpoint> {
        self.state
            .lock()
            .history
            .iter()
            .filter(|(f, _)| *f == frequency)
            .map(|(_, c)| *c)
            .collect()
    }

    pub fn fail_next_save(&self) {
        self.state.lock().fail_next_save = true;
    }
}

#[async_trait::async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, frequency: Frequency) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self.current(frequency))
    }

    async fn save(
        &self,
        frequency: Frequency,
        checkpoint: &Checkpoint,
    ) -> Result<(), CheckpointError> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next_save) {
            return Err(CheckpointError::Storage("injected save failure".to_string()));
        }
        state.current.insert(frequency, *checkpoint);
        state.history.push((frequency, *checkpoint));
        Ok(())
    }
}
