//! Resumption watermark for one delivery cycle.
//!
//! Invariant: every recipient with `id <= last_processed_id` for `cycle_date`
//! has its delivery outcome durably reflected in the backing store. The
//! watermark only moves after the corresponding database commit.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::id::RecipientId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub last_processed_id: RecipientId,
    pub cycle_date: NaiveDate,
}

impl Checkpoint {
    /// Start-of-cycle checkpoint (watermark `0`).
    pub fn initial(cycle_date: NaiveDate) -> Self {
        Self {
            last_processed_id: RecipientId::ZERO,
            cycle_date,
        }
    }

    /// Checkpoint after a committed batch whose highest id was `id`.
    pub fn at(id: RecipientId, cycle_date: NaiveDate) -> Self {
        Self {
            last_processed_id: id,
            cycle_date,
        }
    }

    /// Watermark to resume from on `today`.
    ///
    /// A checkpoint left behind by an earlier day's interrupted run does not
    /// apply to today's cycle, so it resumes from `0`.
    pub fn resume_from(&self, today: NaiveDate) -> RecipientId {
        if self.cycle_date == today {
            self.last_processed_id
        } else {
            RecipientId::ZERO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
    }

    #[test]
    fn same_day_checkpoint_resumes_from_watermark() {
        let cp = Checkpoint::at(RecipientId::new(40), date(4));
        assert_eq!(cp.resume_from(date(4)), RecipientId::new(40));
    }

    #[test]
    fn stale_checkpoint_resumes_from_zero() {
        let cp = Checkpoint::at(RecipientId::new(40), date(3));
        assert_eq!(cp.resume_from(date(4)), RecipientId::ZERO);
    }

    #[test]
    fn checkpoint_serializes_as_plain_json() {
        let cp = Checkpoint::at(RecipientId::new(7), date(4));
        let json = serde_json::to_string(&cp).unwrap();
        assert_eq!(json, r#"{"last_processed_id":7,"cycle_date":"2025-03-04"}"#);
    }
}
