//! Administrator notifications at the end of a run.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{info, warn};

use crate::pipeline::RunReport;
use crate::render::escape_html;
use crate::transport::{Envelope, Transport, TransportError};

pub const ALERT_SENDER_NAME: &str = "MindFuel Alert System";

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("alert delivery failed: {0}")]
    Transport(#[from] TransportError),
}

#[async_trait::async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify_summary(&self, report: &RunReport) -> Result<(), AlertError>;

    async fn notify_failure(&self, report: &RunReport) -> Result<(), AlertError>;
}

#[async_trait::async_trait]
impl<A> AlertSink for Arc<A>
where
    A: AlertSink + ?Sized,
{
    async fn notify_summary(&self, report: &RunReport) -> Result<(), AlertError> {
        (**self).notify_summary(report).await
    }

    async fn notify_failure(&self, report: &RunReport) -> Result<(), AlertError> {
        (**self).notify_failure(report).await
    }
}

/// Mails the report to the administrator through a transport.
pub struct MailAlertSink<T> {
    transport: T,
    from: String,
    to: String,
}

impl<T: Transport> MailAlertSink<T> {
    pub fn new(transport: T, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            transport,
            from: from.into(),
            to: to.into(),
        }
    }

    fn envelope(&self, report: &RunReport) -> Envelope {
        let text = report.summary_text();
        let html = format!(
            "<!DOCTYPE html><html><body><h2>{}</h2><pre style=\"font-family:monospace\">{}</pre></body></html>",
            escape_html(&report.subject()),
            escape_html(&text)
        );
        Envelope {
            to: self.to.clone(),
            to_name: String::new(),
            from: self.from.clone(),
            from_name: ALERT_SENDER_NAME.to_string(),
            subject: report.subject(),
            html,
            text,
        }
    }

    async fn deliver(&self, report: &RunReport) -> Result<(), AlertError> {
        let envelope = self.envelope(report);
        let mut session = self.transport.open_session().await?;
        let result = session.send(&envelope).await;
        session.close().await;
        result?;
        info!(to = %self.to, subject = %envelope.subject, "alert email sent");
        Ok(())
    }
}

#[async_trait::async_trait]
impl<T: Transport> AlertSink for MailAlertSink<T> {
    async fn notify_summary(&self, report: &RunReport) -> Result<(), AlertError> {
        self.deliver(report).await
    }

    async fn notify_failure(&self, report: &RunReport) -> Result<(), AlertError> {
        self.deliver(report).await
    }
}

/// Logs instead of mailing; used when alerts are disabled or unaddressed.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertSink;

#[async_trait::async_trait]
impl AlertSink for LogAlertSink {
    async fn notify_summary(&self, report: &RunReport) -> Result<(), AlertError> {
        info!(run_id = %report.run_id, subject = %report.subject(), "alert email disabled, summary not mailed");
        Ok(())
    }

    async fn notify_failure(&self, report: &RunReport) -> Result<(), AlertError> {
        warn!(
            run_id = %report.run_id,
            subject = %report.subject(),
            error = report.error.as_deref().unwrap_or_default(),
            "alert email disabled, failure not mailed"
        );
        Ok(())
    }
}

/// Kind of notification captured by [`RecordingAlertSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Summary,
    Failure,
}

/// Captures notifications for assertions. Intended for tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingAlertSink {
    sent: Arc<Mutex<Vec<(AlertKind, RunReport)>>>,
    fail: Arc<Mutex<bool>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every notification fail after being recorded.
    pub fn fail_deliveries(&self) {
        *self.fail.lock() = true;
    }

    pub fn sent(&self) -> Vec<(AlertKind, RunReport)> {
        self.sent.lock().clone()
    }

    fn record(&self, kind: AlertKind, report: &RunReport) -> Result<(), AlertError> {
        self.sent.lock().push((kind, report.clone()));
        if *self.fail.lock() {
            return Err(AlertError::Transport(TransportError::Transient(
                "alert relay down".to_string(),
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl AlertSink for RecordingAlertSink {
    async fn notify_summary(&self, report: &RunReport) -> Result<(), AlertError> {
        self.record(AlertKind::Summary, report)
    }

    async fn notify_failure(&self, report: &RunReport) -> Result<(), AlertError> {
        self.record(AlertKind::Failure, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InMemoryTransport;
    use chrono::{TimeZone, Utc, Weekday};
    use mindfuel_core::{RunId, RunStatistics};
    use std::time::Duration;

    fn report(success: bool) -> RunReport {
        let at = Utc.with_ymd_and_hms(2025, 3, 5, 6, 0, 0).unwrap();
        RunReport {
            run_id: RunId::new(),
            cycle_date: at.date_naive(),
            weekday: Weekday::Wed,
            started_at: at,
            finished_at: at,
            duration: Duration::from_secs(3),
            stats: RunStatistics::default(),
            success,
            error: (!success).then(|| "content unavailable: <none>".to_string()),
        }
    }

    #[tokio::test]
    async fn mails_report_to_admin() {
        let transport = InMemoryTransport::new();
        let sink = MailAlertSink::new(transport.clone(), "bot@mindfuel.app", "ops@mindfuel.app");

        sink.notify_failure(&report(false)).await.unwrap();

        let mail = &transport.delivered()[0];
        assert_eq!(mail.to, "ops@mindfuel.app");
        assert_eq!(mail.from_name, ALERT_SENDER_NAME);
        assert_eq!(mail.subject, "CRITICAL FAILURE: MindFuel Wednesday");
        assert!(mail.text.contains("Status: FAILED"));
        assert!(mail.html.contains("&lt;none&gt;"));
        assert_eq!(transport.sessions_closed(), 1);
    }

    #[tokio::test]
    async fn transport_failure_surfaces_as_alert_error() {
        let transport = InMemoryTransport::new();
        transport.refuse_sessions(1);
        let sink = MailAlertSink::new(transport, "bot@mindfuel.app", "ops@mindfuel.app");

        assert!(sink.notify_summary(&report(true)).await.is_err());
    }
}
