//! End-of-run report sent to the administrator and logged as the run summary.

use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::Serialize;

use mindfuel_core::{RunId, RunStatistics};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub cycle_date: NaiveDate,
    #[serde(serialize_with = "serialize_weekday")]
    pub weekday: Weekday,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration: Duration,
    pub stats: RunStatistics,
    pub success: bool,
    /// Fatal error text for failed runs.
    pub error: Option<String>,
}

fn serialize_weekday<S: serde::Serializer>(day: &Weekday, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(day_name(*day))
}

pub fn day_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

impl RunReport {
    pub fn day_name(&self) -> &'static str {
        day_name(self.weekday)
    }

    /// Admin alert subject line.
    pub fn subject(&self) -> String {
        if self.success {
            format!("MindFuel Report: {}", self.day_name())
        } else {
            format!("CRITICAL FAILURE: MindFuel {}", self.day_name())
        }
    }

    /// Plain-text admin report.
    pub fn summary_text(&self) -> String {
        let stats = &self.stats;
        let secs = self.duration.as_secs_f64();
        let mut out = String::new();

        // Writing to a String is infallible.
        let _ = writeln!(out, "MindFuel Email Automation Report");
        let _ = writeln!(out, "{}", "=".repeat(30));
        let _ = writeln!(out, "Run: {}", self.run_id);
        let _ = writeln!(out, "Timestamp: {}", self.finished_at.format("%Y-%m-%d %H:%M:%S UTC"));
        let _ = writeln!(out, "Day: {}", self.day_name());
        let _ = writeln!(out, "Status: {}", if self.success { "SUCCESS" } else { "FAILED" });
        if let Some(error) = &self.error {
            let _ = writeln!(out, "Error: {error}");
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "STATISTICS:");
        let _ = writeln!(out, "-----------");
        let _ = writeln!(out, "Total processed: {}", stats.processed);
        let _ = writeln!(out, "Successfully sent: {}", stats.sent);
        let _ = writeln!(out, "Failed: {}", stats.failed);
        let _ = writeln!(out, "Success rate: {:.2}%", stats.success_rate());
        let _ = writeln!(out);
        let _ = writeln!(out, "BREAKDOWN:");
        let _ = writeln!(out, "----------");
        let _ = writeln!(out, "Daily subscribers: {}", stats.daily_count);
        if stats.weekly.ran {
            let _ = writeln!(out, "Weekly subscribers: {}", stats.weekly_count);
        } else {
            let _ = writeln!(out, "Weekly subscribers: {} (skipped)", stats.weekly_count);
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "PERFORMANCE:");
        let _ = writeln!(out, "------------");
        let _ = writeln!(out, "Duration: {secs:.2} seconds ({:.2} minutes)", secs / 60.0);
        let _ = writeln!(
            out,
            "Throughput: {:.2} emails/second",
            stats.throughput(self.duration)
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn report(success: bool) -> RunReport {
        let started_at = Utc.with_ymd_and_hms(2025, 3, 3, 6, 0, 0).unwrap();
        RunReport {
            run_id: RunId::new(),
            cycle_date: started_at.date_naive(),
            weekday: Weekday::Mon,
            started_at,
            finished_at: started_at + chrono::Duration::seconds(50),
            duration: Duration::from_secs(50),
            stats: RunStatistics {
                processed: 200,
                sent: 150,
                failed: 50,
                daily_count: 120,
                weekly_count: 80,
                ..Default::default()
            },
            success,
            error: (!success).then(|| "storage query failed: boom".to_string()),
        }
    }

    #[test]
    fn subjects_name_the_day() {
        assert_eq!(report(true).subject(), "MindFuel Report: Monday");
        assert_eq!(report(false).subject(), "CRITICAL FAILURE: MindFuel Monday");
    }

    #[test]
    fn summary_contains_rates_and_breakdown() {
        let text = report(true).summary_text();
        assert!(text.contains("Status: SUCCESS"));
        assert!(text.contains("Success rate: 75.00%"));
        assert!(text.contains("Daily subscribers: 120"));
        assert!(text.contains("Duration: 50.00 seconds (0.83 minutes)"));
        assert!(text.contains("Throughput: 3.00 emails/second"));
        assert!(!text.contains("Error:"));
    }

    #[test]
    fn failed_summary_carries_the_error() {
        let text = report(false).summary_text();
        assert!(text.contains("Status: FAILED"));
        assert!(text.contains("Error: storage query failed: boom"));
    }
}
