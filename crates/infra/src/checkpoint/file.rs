use std::path::PathBuf;

use tracing::instrument;

use mindfuel_core::{Checkpoint, Frequency};

use super::{CheckpointError, CheckpointStore};
use crate::io::{atomic_write_async, read_optional_async};

/// One JSON file per frequency under a state directory
/// (`<dir>/checkpoint_daily.json`, `<dir>/checkpoint_weekly.json`).
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, frequency: Frequency) -> PathBuf {
        self.dir.join(format!("checkpoint_{}.json", frequency.as_str()))
    }
}

#[async_trait::async_trait]
impl CheckpointStore for FileCheckpointStore {
    #[instrument(skip(self), fields(frequency = %frequency), err)]
    async fn load(&self, frequency: Frequency) -> Result<Option<Checkpoint>, CheckpointError> {
        let Some(text) = read_optional_async(self.path_for(frequency)).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&text)?))
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
        let bytes = serde_json::to_vec_pretty(checkpoint)?;
        atomic_write_async(self.path_for(frequency), bytes).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use mindfuel_core::RecipientId;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 4).unwrap()
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        assert!(store.load(Frequency::Daily).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn frequencies_are_stored_independently() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("state"));

        store
            .save(Frequency::Daily, &Checkpoint::at(RecipientId::new(40), today()))
            .await
            .unwrap();
        store
            .save(Frequency::Weekly, &Checkpoint::at(RecipientId::new(7), today()))
            .await
            .unwrap();

        let daily = store.load(Frequency::Daily).await.unwrap().unwrap();
        let weekly = store.load(Frequency::Weekly).await.unwrap().unwrap();
        assert_eq!(daily.last_processed_id, RecipientId::new(40));
        assert_eq!(weekly.last_processed_id, RecipientId::new(7));
    }

    #[tokio::test]
    async fn corrupt_file_is_a_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        std::fs::write(store.path_for(Frequency::Daily), "{not json").unwrap();

        assert!(matches!(
            store.load(Frequency::Daily).await,
            Err(CheckpointError::Serialization(_))
        ));
    }
}
