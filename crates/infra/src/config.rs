//! Pipeline settings read from the environment.
//!
//! Every setting has an environment variable; only the database url, relay
//! url and sender address are required. `validate` is run by the
//! constructors, so a `PipelineConfig` in hand is always usable.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::Weekday;
use thiserror::Error;

use crate::pipeline::{DeliveryPolicy, RunConfig, SenderIdentity};
use crate::render::TemplateRenderer;
use crate::retry::RetryPolicy;
use crate::transport::validate_address;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("cannot read template {}: {reason}", path.display())]
    Template { path: PathBuf, reason: String },
}

impl ConfigError {
    fn invalid(var: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            var,
            reason: reason.into(),
        }
    }
}

/// Where checkpoints are persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CheckpointBackend {
    /// JSON files under `CHECKPOINT_DIR`.
    #[default]
    File,
    /// The `delivery_checkpoints` table.
    Postgres,
}

impl FromStr for CheckpointBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(CheckpointBackend::File),
            "postgres" | "db" => Ok(CheckpointBackend::Postgres),
            other => Err(format!("unknown checkpoint backend {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub batch_size: usize,
    pub weekly_day: Weekday,
    pub content_path: PathBuf,
    pub content_api_url: Option<String>,
    pub checkpoint_dir: PathBuf,
    pub checkpoint_backend: CheckpointBackend,
    pub template_dir: Option<PathBuf>,
    pub relay_url: String,
    pub relay_token: Option<String>,
    pub sender_email: String,
    pub sender_name: String,
    pub subject: String,
    pub send_timeout: Duration,
    pub send_max_attempts: u32,
    pub send_backoff: Duration,
    pub send_delay: Duration,
    pub send_alerts: bool,
    pub alert_email: Option<String>,
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let config = Self {
            database_url: required("DATABASE_URL")?,
            db_max_connections: parse_or(&get, "DB_MAX_CONNECTIONS", 2)?,
            batch_size: parse_or(&get, "BATCH_SIZE", 1000)?,
            weekly_day: parse_or(&get, "WEEKLY_DAY", Weekday::Mon)?,
            content_path: get("CONTENT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("api_data/quote_data.json")),
            content_api_url: get("CONTENT_API_URL"),
            checkpoint_dir: get("CHECKPOINT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("state")),
            checkpoint_backend: parse_or(&get, "CHECKPOINT_BACKEND", CheckpointBackend::File)?,
            template_dir: get("TEMPLATE_DIR").map(PathBuf::from),
            relay_url: required("MAIL_RELAY_URL")?,
            relay_token: get("MAIL_RELAY_TOKEN"),
            sender_email: required("SENDER_EMAIL")?,
            sender_name: get("SENDER_NAME").unwrap_or_else(|| "MindFuel".to_string()),
            subject: get("MAIL_SUBJECT").unwrap_or_else(|| "Inspiration from MindFuel".to_string()),
            send_timeout: Duration::from_secs(parse_or(&get, "SEND_TIMEOUT_SECS", 30)?),
            send_max_attempts: parse_or(&get, "SEND_MAX_ATTEMPTS", 3)?,
            send_backoff: Duration::from_millis(parse_or(&get, "SEND_BACKOFF_MS", 2000)?),
            send_delay: Duration::from_millis(parse_or(&get, "SEND_DELAY_MS", 100)?),
            send_alerts: parse_bool(get("SEND_ALERTS"), "SEND_ALERTS")?,
            alert_email: get("ALERT_EMAIL"),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::invalid("BATCH_SIZE", "must be greater than zero"));
        }
        if self.db_max_connections == 0 {
            return Err(ConfigError::invalid("DB_MAX_CONNECTIONS", "must be greater than zero"));
        }
        if self.send_max_attempts == 0 {
            return Err(ConfigError::invalid("SEND_MAX_ATTEMPTS", "must be at least 1"));
        }
        if self.send_timeout.is_zero() {
            return Err(ConfigError::invalid("SEND_TIMEOUT_SECS", "must be greater than zero"));
        }
        if !self.relay_url.starts_with("http://") && !self.relay_url.starts_with("https://") {
            return Err(ConfigError::invalid("MAIL_RELAY_URL", "must be an http(s) url"));
        }
        validate_address(&self.sender_email)
            .map_err(|e| ConfigError::invalid("SENDER_EMAIL", e.to_string()))?;
        if let Some(alert) = &self.alert_email {
            validate_address(alert).map_err(|e| ConfigError::invalid("ALERT_EMAIL", e.to_string()))?;
        }
        Ok(())
    }

    pub fn delivery_policy(&self) -> DeliveryPolicy {
        DeliveryPolicy {
            retry: RetryPolicy::exponential(self.send_max_attempts, self.send_backoff),
            inter_send_delay: self.send_delay,
        }
    }

    /// Templates from `TEMPLATE_DIR`, or the built-in ones.
    pub fn renderer(&self) -> Result<TemplateRenderer, ConfigError> {
        match &self.template_dir {
            Some(dir) => TemplateRenderer::from_dir(dir),
            None => Ok(TemplateRenderer::builtin()),
        }
    }

    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            batch_size: self.batch_size,
            weekly_day: self.weekly_day,
        }
    }

    pub fn sender(&self) -> SenderIdentity {
        SenderIdentity {
            address: self.sender_email.clone(),
            name: self.sender_name.clone(),
            subject: self.subject.clone(),
        }
    }

    /// Admin address when alert mail should actually be sent.
    pub fn alert_recipient(&self) -> Option<&str> {
        if self.send_alerts {
            self.alert_email.as_deref()
        } else {
            None
        }
    }
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(var) {
        Some(raw) => raw
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(var, format!("{raw:?}: {e}"))),
        None => Ok(default),
    }
}

fn parse_bool(raw: Option<String>, var: &'static str) -> Result<bool, ConfigError> {
    match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(false),
        Some("true" | "1" | "yes") => Ok(true),
        Some("false" | "0" | "no") => Ok(false),
        Some(other) => Err(ConfigError::invalid(var, format!("{other:?} is not a boolean"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        let mut map: HashMap<String, String> = [
            ("DATABASE_URL", "postgres://localhost/mindfuel"),
            ("MAIL_RELAY_URL", "https://relay.example.com/send"),
            ("SENDER_EMAIL", "hello@mindfuel.app"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in pairs {
            map.insert(k.to_string(), v.to_string());
        }
        map
    }

    fn load(map: &HashMap<String, String>) -> Result<PipelineConfig, ConfigError> {
        PipelineConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = load(&env(&[])).unwrap();
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.weekly_day, Weekday::Mon);
        assert_eq!(config.db_max_connections, 2);
        assert_eq!(config.sender_name, "MindFuel");
        assert!(!config.send_alerts);
        assert_eq!(config.checkpoint_backend, CheckpointBackend::File);
        assert_eq!(config.alert_recipient(), None);

        let policy = config.delivery_policy();
        assert_eq!(policy.retry.max_attempts, 3);
        assert_eq!(policy.retry.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.retry.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.inter_send_delay, Duration::from_millis(100));
    }

    #[test]
    fn required_settings_are_reported_by_name() {
        let mut map = env(&[]);
        map.remove("MAIL_RELAY_URL");
        assert_eq!(load(&map), Err(ConfigError::Missing("MAIL_RELAY_URL")));

        let map = env(&[("DATABASE_URL", "  ")]);
        assert_eq!(load(&map), Err(ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn rejects_invalid_values() {
        for (var, value) in [
            ("BATCH_SIZE", "0"),
            ("BATCH_SIZE", "many"),
            ("WEEKLY_DAY", "Someday"),
            ("SEND_ALERTS", "maybe"),
            ("SENDER_EMAIL", "nobody"),
            ("MAIL_RELAY_URL", "smtp://relay"),
            ("CHECKPOINT_BACKEND", "redis"),
        ] {
            match load(&env(&[(var, value)])) {
                Err(ConfigError::Invalid { var: got, .. }) => assert_eq!(got, var),
                other => panic!("{var}={value}: {other:?}"),
            }
        }
    }

    #[test]
    fn alerts_need_both_switch_and_address() {
        let config = load(&env(&[("SEND_ALERTS", "TRUE"), ("ALERT_EMAIL", "ops@mindfuel.app")])).unwrap();
        assert_eq!(config.alert_recipient(), Some("ops@mindfuel.app"));

        let config = load(&env(&[("SEND_ALERTS", "true")])).unwrap();
        assert_eq!(config.alert_recipient(), None);
    }

    #[test]
    fn unreadable_template_dir_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let config = load(&env(&[("TEMPLATE_DIR", missing.to_str().unwrap())])).unwrap();
        match config.renderer() {
            Err(ConfigError::Template { path, .. }) => assert!(path.starts_with(&missing)),
            other => panic!("expected template error, got {other:?}"),
        }

        assert!(load(&env(&[])).unwrap().renderer().is_ok());
    }

    #[test]
    fn content_api_url_is_optional() {
        assert_eq!(load(&env(&[])).unwrap().content_api_url, None);

        let config = load(&env(&[("CONTENT_API_URL", "https://zenquotes.io/api/today")])).unwrap();
        assert_eq!(config.content_api_url.as_deref(), Some("https://zenquotes.io/api/today"));
    }

    #[test]
    fn weekly_day_accepts_names() {
        let config = load(&env(&[("WEEKLY_DAY", "friday")])).unwrap();
        assert_eq!(config.weekly_day, Weekday::Fri);
    }
}
