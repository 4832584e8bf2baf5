//! Durable resumption watermarks, one per frequency.

pub mod file;
pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use thiserror::Error;

use mindfuel_core::{Checkpoint, Frequency};

pub use file::FileCheckpointStore;
pub use in_memory::InMemoryCheckpointStore;
pub use postgres::PostgresCheckpointStore;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("checkpoint storage error: {0}")]
    Storage(String),
}

/// Checkpoint persistence port.
#[async_trait::async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Last saved checkpoint for `frequency`, or `None` if none was ever saved.
    async fn load(&self, frequency: Frequency) -> Result<Option<Checkpoint>, CheckpointError>;

    /// Durably replace the checkpoint for `frequency`.
    async fn save(&self, frequency: Frequency, checkpoint: &Checkpoint)
    -> Result<(), CheckpointError>;
}

#[async_trait::async_trait]
impl<S> CheckpointStore for Arc<S>
where
    S: CheckpointStore + ?Sized,
{
    async fn load(&self, frequency: Frequency) -> Result<Option<Checkpoint>, CheckpointError> {
        (**self).load(frequency).await
    }

    async fn save(
        &self,
        frequency: Frequency,
        checkpoint: &Checkpoint,
    ) -> Result<(), CheckpointError> {
        (**self).save(frequency, checkpoint).await
    }
}
