//! Drives the per-frequency batch loop and decides the run's outcome.
//!
//! Per phase: `Init → FetchingBatch → Delivering → Committing → (FetchingBatch | Done)`,
//! with `Failed` reachable from any step. Any fatal error halts the run
//! immediately; no further batches are fetched.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use mindfuel_core::{Content, Frequency, RecipientId, RunId, RunStatistics};
use mindfuel_observability::SUMMARY_TARGET;

use super::committer::{CommitError, FeedbackCommitter};
use super::engine::{DeliveryEngine, DeliveryError};
use super::report::{RunReport, day_name};
use super::source::RecipientSource;
use crate::alerts::AlertSink;
use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::clock::{Clock, start_of_day};
use crate::content::{ContentError, ContentProvider};
use crate::recipients::{RecipientStore, StorageError};
use crate::render::Renderer;
use crate::transport::Transport;

const PROGRESS_EVERY: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    pub batch_size: usize,
    /// Day on which the weekly phase runs.
    pub weekly_day: Weekday,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            weekly_day: Weekday::Mon,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    FetchingBatch,
    Delivering,
    Committing,
    Done,
    Failed,
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    ContentUnavailable(#[from] ContentError),

    #[error("recipient query failed: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    SessionUnavailable(#[from] DeliveryError),
}

/// State of one run, threaded through every phase.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: RunId,
    pub cycle_date: NaiveDate,
    pub weekday: Weekday,
    pub started_at: DateTime<Utc>,
    pub stats: RunStatistics,
    pub phase: Phase,
    /// Frequency being processed, if any.
    pub frequency: Option<Frequency>,
    timer: Instant,
}

impl RunContext {
    pub fn new(clock: &dyn Clock) -> Self {
        let started_at = clock.now();
        Self {
            run_id: RunId::new(),
            cycle_date: started_at.date_naive(),
            weekday: clock.weekday(),
            started_at,
            stats: RunStatistics::default(),
            phase: Phase::Init,
            frequency: None,
            timer: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.timer.elapsed()
    }

    fn enter(&mut self, phase: Phase) {
        debug!(run_id = %self.run_id, frequency = ?self.frequency, from = ?self.phase, to = ?phase, "phase transition");
        self.phase = phase;
    }

    fn report(&self, finished_at: DateTime<Utc>, error: Option<String>) -> RunReport {
        RunReport {
            run_id: self.run_id,
            cycle_date: self.cycle_date,
            weekday: self.weekday,
            started_at: self.started_at,
            finished_at,
            duration: self.elapsed(),
            stats: self.stats.clone(),
            success: error.is_none(),
            error,
        }
    }
}

/// Wires source, engine and committer into a run.
///
/// The recipient store is shared by the source and the committer; the run is
/// sequential so their storage access never overlaps.
pub struct RunOrchestrator<S, C, T, R> {
    source: RecipientSource<S>,
    engine: DeliveryEngine<T, R>,
    committer: FeedbackCommitter<S, C>,
    content: Arc<dyn ContentProvider>,
    alerts: Arc<dyn AlertSink>,
    clock: Arc<dyn Clock>,
    config: RunConfig,
}

impl<S, C, T, R> RunOrchestrator<S, C, T, R>
where
    S: RecipientStore + Clone,
    C: CheckpointStore,
    T: Transport,
    R: Renderer,
{
    pub fn new(
        store: S,
        checkpoints: C,
        engine: DeliveryEngine<T, R>,
        content: Arc<dyn ContentProvider>,
        alerts: Arc<dyn AlertSink>,
        clock: Arc<dyn Clock>,
        config: RunConfig,
    ) -> Self {
        Self {
            source: RecipientSource::new(store.clone()),
            engine,
            committer: FeedbackCommitter::new(store, checkpoints),
            content,
            alerts,
            clock,
            config,
        }
    }

    /// Run once, notify the administrator and return the report.
    ///
    /// Alert failures are logged and never change the report.
    pub async fn run(&self) -> RunReport {
        let mut ctx = RunContext::new(self.clock.as_ref());
        info!(
            run_id = %ctx.run_id,
            cycle_date = %ctx.cycle_date,
            day = day_name(ctx.weekday),
            "run started"
        );

        match self.execute(&mut ctx).await {
            Ok(()) => {
                let report = ctx.report(self.clock.now(), None);
                log_summary(&report);
                if let Err(e) = self.alerts.notify_summary(&report).await {
                    warn!(run_id = %report.run_id, error = %e, "summary alert not delivered");
                }
                info!(
                    run_id = %report.run_id,
                    duration_secs = report.duration.as_secs_f64(),
                    "run completed"
                );
                report
            }
            Err(e) => {
                ctx.enter(Phase::Failed);
                error!(
                    run_id = %ctx.run_id,
                    frequency = ?ctx.frequency,
                    processed = ctx.stats.processed,
                    error = %e,
                    "run failed"
                );
                let report = ctx.report(self.clock.now(), Some(e.to_string()));
                log_summary(&report);
                if let Err(alert) = self.alerts.notify_failure(&report).await {
                    warn!(run_id = %report.run_id, error = %alert, "failure alert not delivered");
                }
                report
            }
        }
    }

    /// Run every scheduled phase against `ctx`, stopping at the first fatal error.
    pub async fn execute(&self, ctx: &mut RunContext) -> Result<(), RunError> {
        ctx.enter(Phase::Init);
        let content = self.content.todays_content(ctx.cycle_date).await?;
        info!(
            preview = %content.preview(30),
            author = %content.attribution,
            "content loaded"
        );

        for frequency in Frequency::ALL {
            if frequency == Frequency::Weekly && ctx.weekday != self.config.weekly_day {
                info!(
                    today = day_name(ctx.weekday),
                    weekly_day = day_name(self.config.weekly_day),
                    "skipping weekly subscribers"
                );
                continue;
            }
            self.run_phase(ctx, frequency, &content).await?;
        }
        Ok(())
    }

    async fn run_phase(
        &self,
        ctx: &mut RunContext,
        frequency: Frequency,
        content: &Content,
    ) -> Result<(), RunError> {
        ctx.frequency = Some(frequency);
        ctx.enter(Phase::Init);
        ctx.stats.mark_phase_started(frequency);

        let resume_from = self
            .committer
            .checkpoints()
            .load(frequency)
            .await?
            .map(|c| c.resume_from(ctx.cycle_date))
            .unwrap_or(RecipientId::ZERO);
        if resume_from > RecipientId::ZERO {
            info!(%frequency, last_processed_id = %resume_from, "resuming from checkpoint");
        }

        let mut cursor = self.source.cursor(
            frequency,
            resume_from,
            self.config.batch_size,
            start_of_day(ctx.cycle_date),
        );

        loop {
            ctx.enter(Phase::FetchingBatch);
            let Some(batch) = cursor.next().await? else {
                break;
            };
            let Some(batch_max_id) = batch.max_id() else {
                break;
            };

            ctx.enter(Phase::Delivering);
            info!(%frequency, batch_size = batch.len(), after_id = %cursor.position(), "delivering batch");
            let mut attempted = ctx.stats.processed;
            let outcomes = self
                .engine
                .deliver_batch_with(&batch, content, |_| {
                    attempted += 1;
                    if attempted % PROGRESS_EVERY == 0 {
                        info!(attempted, "progress");
                    }
                })
                .await?;
            ctx.stats.record_batch(frequency, &outcomes);

            ctx.enter(Phase::Committing);
            self.committer
                .commit(frequency, &outcomes, batch_max_id, ctx.cycle_date, self.clock.now())
                .await?;
            cursor.advance(batch_max_id);
        }

        self.committer.reset_cycle(frequency, ctx.cycle_date).await?;
        ctx.enter(Phase::Done);
        let phase = ctx.stats.phase(frequency);
        info!(
            %frequency,
            processed = phase.recipients,
            sent = phase.sent,
            failed = phase.failed,
            batches = phase.batches,
            "completed subscribers"
        );
        Ok(())
    }
}

fn log_summary(report: &RunReport) {
    let stats = &report.stats;
    info!(
        target: SUMMARY_TARGET,
        run_id = %report.run_id,
        day = report.day_name(),
        success = report.success,
        processed = stats.processed,
        daily = stats.daily_count,
        weekly = stats.weekly_count,
        sent = stats.sent,
        failed = stats.failed,
        success_rate = stats.success_rate(),
        duration_secs = report.duration.as_secs_f64(),
        throughput = stats.throughput(report.duration),
        "run summary"
    );
}
