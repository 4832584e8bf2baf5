//! Outbound mail transport.
//!
//! A [`Transport`] opens [`Session`]s; one session is held per batch and
//! reused for every recipient in it.

pub mod http;
pub mod in_memory;

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

pub use http::HttpRelayTransport;
pub use in_memory::{InMemoryTransport, SendAttempt};

/// A fully rendered message ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope {
    pub to: String,
    pub to_name: String,
    pub from: String,
    pub from_name: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Worth retrying: timeouts, throttling, relay-side errors.
    #[error("transient transport error: {0}")]
    Transient(String),

    /// Retrying cannot help, e.g. a malformed or rejected address.
    #[error("permanent recipient error: {0}")]
    Permanent(String),

    /// The session is no longer usable and must be re-opened.
    #[error("transport session dropped: {0}")]
    SessionDropped(String),

    /// A session could not be established.
    #[error("transport connect failed: {0}")]
    Connect(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Permanent(_))
    }

    pub fn is_session_lost(&self) -> bool {
        matches!(
            self,
            TransportError::SessionDropped(_) | TransportError::Connect(_)
        )
    }
}

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn Session>, TransportError>;
}

#[async_trait::async_trait]
pub trait Session: Send {
    async fn send(&mut self, envelope: &Envelope) -> Result<(), TransportError>;

    async fn close(self: Box<Self>);
}

#[async_trait::async_trait]
impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    async fn open_session(&self) -> Result<Box<dyn Session>, TransportError> {
        (**self).open_session().await
    }
}

/// Reject addresses that are not shaped like `local@domain.tld`.
pub fn validate_address(address: &str) -> Result<(), TransportError> {
    let invalid = || TransportError::Permanent(format!("malformed address: {address:?}"));

    if address.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(invalid());
    }
    let (local, domain) = address.rsplit_once('@').ok_or_else(invalid)?;
    if local.is_empty() || local.contains('@') {
        return Err(invalid());
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return Err(invalid());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_addresses() {
        for addr in ["a@b.co", "first.last+tag@mail.example.org"] {
            assert!(validate_address(addr).is_ok(), "{addr}");
        }
    }

    #[test]
    fn rejects_malformed_addresses() {
        for addr in ["", "plain", "@example.com", "a@localhost", "a@.com", "a@b..com", "a b@c.com", "a@b@c.com"] {
            assert!(
                matches!(validate_address(addr), Err(TransportError::Permanent(_))),
                "{addr}"
            );
        }
    }

    #[test]
    fn only_permanent_errors_stop_retries() {
        assert!(TransportError::Transient("x".into()).is_retryable());
        assert!(TransportError::SessionDropped("x".into()).is_retryable());
        assert!(!TransportError::Permanent("x".into()).is_retryable());
    }
}
