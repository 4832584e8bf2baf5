//! Per-recipient delivery results produced by the delivery engine.

use serde::{Deserialize, Serialize};

use crate::id::RecipientId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

/// Outcome for one recipient in one batch. Ephemeral: consumed by the
/// feedback committer and then discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub recipient_id: RecipientId,
    pub status: DeliveryStatus,
    /// Transport attempts made (0 when the recipient was rejected before sending).
    pub attempts: u32,
    /// Last error, for failed outcomes.
    pub error: Option<String>,
}

impl DeliveryOutcome {
    pub fn sent(recipient_id: RecipientId, attempts: u32) -> Self {
        Self {
            recipient_id,
            status: DeliveryStatus::Sent,
            attempts,
            error: None,
        }
    }

    pub fn failed(recipient_id: RecipientId, attempts: u32, error: impl Into<String>) -> Self {
        Self {
            recipient_id,
            status: DeliveryStatus::Failed,
            attempts,
            error: Some(error.into()),
        }
    }

    pub fn is_sent(&self) -> bool {
        self.status == DeliveryStatus::Sent
    }
}

/// Ids of the recipients whose delivery succeeded.
pub fn sent_ids(outcomes: &[DeliveryOutcome]) -> Vec<RecipientId> {
    outcomes
        .iter()
        .filter(|o| o.is_sent())
        .map(|o| o.recipient_id)
        .collect()
}
