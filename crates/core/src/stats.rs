//! Run statistics accumulated by the orchestrator and emitted once per run.

use std::time::Duration;

use serde::Serialize;

use crate::outcome::DeliveryOutcome;
use crate::recipient::Frequency;

/// Counters for one frequency phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PhaseStatistics {
    pub batches: u64,
    pub recipients: u64,
    pub sent: u64,
    pub failed: u64,
    /// Whether the phase ran at all (weekly is skipped on other days).
    pub ran: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStatistics {
    pub processed: u64,
    pub sent: u64,
    pub failed: u64,
    pub daily_count: u64,
    pub weekly_count: u64,
    pub daily: PhaseStatistics,
    pub weekly: PhaseStatistics,
}

impl RunStatistics {
    pub fn phase(&self, frequency: Frequency) -> &PhaseStatistics {
        match frequency {
            Frequency::Daily => &self.daily,
            Frequency::Weekly => &self.weekly,
        }
    }

    fn phase_mut(&mut self, frequency: Frequency) -> &mut PhaseStatistics {
        match frequency {
            Frequency::Daily => &mut self.daily,
            Frequency::Weekly => &mut self.weekly,
        }
    }

    pub fn mark_phase_started(&mut self, frequency: Frequency) {
        self.phase_mut(frequency).ran = true;
    }

    /// Fold one delivered batch into the counters.
    pub fn record_batch(&mut self, frequency: Frequency, outcomes: &[DeliveryOutcome]) {
        let len = outcomes.len() as u64;
        let sent = outcomes.iter().filter(|o| o.is_sent()).count() as u64;
        let failed = len - sent;

        self.processed += len;
        self.sent += sent;
        self.failed += failed;
        match frequency {
            Frequency::Daily => self.daily_count += len,
            Frequency::Weekly => self.weekly_count += len,
        }

        let phase = self.phase_mut(frequency);
        phase.batches += 1;
        phase.recipients += len;
        phase.sent += sent;
        phase.failed += failed;
    }

    /// Percentage of processed recipients that were sent (0 when nothing ran).
    pub fn success_rate(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.sent as f64 / self.processed as f64 * 100.0
        }
    }

    /// Sends per second over `elapsed` (0 for a zero duration).
    pub fn throughput(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs > 0.0 { self.sent as f64 / secs } else { 0.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::RecipientId;

    #[test]
    fn record_batch_updates_totals_and_phase() {
        let mut stats = RunStatistics::default();
        stats.record_batch(
            Frequency::Daily,
            &[
                DeliveryOutcome::sent(RecipientId::new(1), 1),
                DeliveryOutcome::failed(RecipientId::new(2), 3, "boom"),
            ],
        );
        stats.record_batch(Frequency::Weekly, &[DeliveryOutcome::sent(RecipientId::new(3), 1)]);

        assert_eq!(stats.processed, 3);
        assert_eq!(stats.sent, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.daily_count, 2);
        assert_eq!(stats.weekly_count, 1);
        assert_eq!(stats.daily.batches, 1);
        assert_eq!(stats.daily.failed, 1);
        assert_eq!(stats.weekly.sent, 1);
    }

    #[test]
    fn rates_handle_empty_runs() {
        let stats = RunStatistics::default();
        assert_eq!(stats.success_rate(), 0.0);
        assert_eq!(stats.throughput(Duration::ZERO), 0.0);
    }
}
