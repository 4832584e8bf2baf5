//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of a recipient row in the backing store.
///
/// Ids are stable, never reused, and totally ordered; the checkpoint
/// watermark is expressed in terms of this ordering.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipientId(i64);

impl RecipientId {
    /// Watermark value meaning "nothing processed yet in this cycle".
    pub const ZERO: RecipientId = RecipientId(0);

    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl core::fmt::Display for RecipientId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<i64> for RecipientId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<RecipientId> for i64 {
    fn from(value: RecipientId) -> Self {
        value.0
    }
}

impl FromStr for RecipientId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<i64>()
            .map_err(|e| DomainError::invalid_id(format!("RecipientId: {e}")))?;
        if value < 0 {
            return Err(DomainError::invalid_id("RecipientId: must not be negative"));
        }
        Ok(Self(value))
    }
}

/// Identifier of one pipeline run, used to correlate log lines and alerts.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Create a new run identifier (UUIDv7, time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for RunId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipient_ids_order_numerically() {
        let mut ids = vec![RecipientId::new(10), RecipientId::new(2), RecipientId::ZERO];
        ids.sort();
        assert_eq!(ids, vec![RecipientId::ZERO, RecipientId::new(2), RecipientId::new(10)]);
    }

    #[test]
    fn recipient_id_parse_rejects_garbage_and_negatives() {
        assert_eq!("42".parse::<RecipientId>().unwrap(), RecipientId::new(42));
        assert!("abc".parse::<RecipientId>().is_err());
        assert!("-1".parse::<RecipientId>().is_err());
    }
}
