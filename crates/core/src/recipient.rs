//! Recipients, their subscription attributes, and the eligibility predicate.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::id::RecipientId;

/// Subscription status as stored in the backing store.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Inactive,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Inactive => "inactive",
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(SubscriptionStatus::Active),
            "inactive" => Ok(SubscriptionStatus::Inactive),
            other => Err(DomainError::validation(format!(
                "unknown subscription status: {other}"
            ))),
        }
    }
}

/// Delivery frequency class of a subscriber.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
}

impl Frequency {
    /// All frequencies, in the order the orchestrator runs their phases.
    pub const ALL: [Frequency; 2] = [Frequency::Daily, Frequency::Weekly];

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
        }
    }
}

impl core::fmt::Display for Frequency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            other => Err(DomainError::validation(format!("unknown frequency: {other}"))),
        }
    }
}

/// A subscriber row. Owned by the backing store; the pipeline only reads it
/// and, through the feedback committer, updates `last_sent_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: RecipientId,
    pub name: String,
    pub address: String,
    pub status: SubscriptionStatus,
    pub frequency: Frequency,
    pub last_sent_at: Option<DateTime<Utc>>,
}

impl Recipient {
    /// Whether this recipient passes the selection predicate.
    ///
    /// All conditions are conjunctive:
    /// - status is active
    /// - frequency matches
    /// - id is strictly after the watermark
    /// - not yet sent since `day_start` (same-day dedup guard)
    pub fn is_eligible(
        &self,
        frequency: Frequency,
        after_id: RecipientId,
        day_start: DateTime<Utc>,
    ) -> bool {
        self.status == SubscriptionStatus::Active
            && self.frequency == frequency
            && self.id > after_id
            && self.last_sent_at.is_none_or(|sent| sent < day_start)
    }
}

/// A bounded, id-ordered slice of recipients processed as one transactional unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    frequency: Frequency,
    recipients: Vec<Recipient>,
}

impl Batch {
    /// Build a batch, sorting by id so delivery happens in ascending order.
    pub fn new(frequency: Frequency, mut recipients: Vec<Recipient>) -> Self {
        recipients.sort_by_key(|r| r.id);
        Self {
            frequency,
            recipients,
        }
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn recipients(&self) -> &[Recipient] {
        &self.recipients
    }

    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    /// Highest id in the batch; the watermark value after this batch commits.
    pub fn max_id(&self) -> Option<RecipientId> {
        self.recipients.last().map(|r| r.id)
    }

    pub fn ids(&self) -> Vec<RecipientId> {
        self.recipients.iter().map(|r| r.id).collect()
    }
}
