//! Mail relay over HTTP.
//!
//! Each envelope is POSTed as JSON to the relay endpoint. Status handling:
//!
//! | Response | Result |
//! |----------|--------|
//! | 2xx | sent |
//! | 408, 429, 5xx | `Transient` |
//! | other 4xx | `Permanent` |
//! | connection failure | `SessionDropped` |

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, instrument};

use super::{Envelope, Session, Transport, TransportError};

#[derive(Debug, Clone)]
pub struct HttpRelayTransport {
    url: String,
    token: Option<String>,
    timeout: Duration,
}

impl HttpRelayTransport {
    pub fn new(url: impl Into<String>, token: Option<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            token: token.filter(|t| !t.is_empty()),
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl Transport for HttpRelayTransport {
    #[instrument(skip(self), fields(url = %self.url), err)]
    async fn open_session(&self) -> Result<Box<dyn Session>, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .pool_max_idle_per_host(1)
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| TransportError::Connect(format!("building http client: {e}")))?;

        debug!("relay session opened");
        Ok(Box::new(HttpRelaySession {
            client,
            url: self.url.clone(),
            token: self.token.clone(),
        }))
    }
}

struct HttpRelaySession {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

#[derive(Serialize)]
struct Mailbox<'a> {
    email: &'a str,
    name: &'a str,
}

#[derive(Serialize)]
struct RelayRequest<'a> {
    from: Mailbox<'a>,
    to: [Mailbox<'a>; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

impl<'a> From<&'a Envelope> for RelayRequest<'a> {
    fn from(envelope: &'a Envelope) -> Self {
        Self {
            from: Mailbox {
                email: &envelope.from,
                name: &envelope.from_name,
            },
            to: [Mailbox {
                email: &envelope.to,
                name: &envelope.to_name,
            }],
            subject: &envelope.subject,
            html: &envelope.html,
            text: &envelope.text,
        }
    }
}

#[async_trait::async_trait]
impl Session for HttpRelaySession {
    async fn send(&mut self, envelope: &Envelope) -> Result<(), TransportError> {
        let mut request = self.client.post(&self.url).json(&RelayRequest::from(envelope));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(classify_request_error)?;
        let status = response.status().as_u16();
        if let Some(err) = classify_status(status) {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(match err {
                TransportError::Permanent(_) => {
                    TransportError::Permanent(format!("relay rejected with {status}: {snippet}"))
                }
                _ => TransportError::Transient(format!("relay answered {status}: {snippet}")),
            });
        }
        Ok(())
    }

    async fn close(self: Box<Self>) {
        debug!("relay session closed");
    }
}

fn classify_request_error(err: reqwest::Error) -> TransportError {
    if err.is_connect() {
        TransportError::SessionDropped(err.to_string())
    } else if err.is_builder() {
        TransportError::Permanent(err.to_string())
    } else {
        TransportError::Transient(err.to_string())
    }
}

/// `None` for success, otherwise the error class for `status`.
pub(crate) fn classify_status(status: u16) -> Option<TransportError> {
    match status {
        200..=299 => None,
        408 | 429 | 500..=599 => Some(TransportError::Transient(status.to_string())),
        400..=499 => Some(TransportError::Permanent(status.to_string())),
        _ => Some(TransportError::Transient(status.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classes() {
        assert!(classify_status(202).is_none());
        assert!(matches!(classify_status(429), Some(TransportError::Transient(_))));
        assert!(matches!(classify_status(408), Some(TransportError::Transient(_))));
        assert!(matches!(classify_status(503), Some(TransportError::Transient(_))));
        assert!(matches!(classify_status(422), Some(TransportError::Permanent(_))));
        assert!(matches!(classify_status(301), Some(TransportError::Transient(_))));
    }

    #[test]
    fn relay_payload_shape() {
        let envelope = Envelope {
            to: "ada@example.com".to_string(),
            to_name: "Ada".to_string(),
            from: "hello@mindfuel.app".to_string(),
            from_name: "MindFuel".to_string(),
            subject: "Hi".to_string(),
            html: "<p>x</p>".to_string(),
            text: "x".to_string(),
        };
        let json = serde_json::to_value(RelayRequest::from(&envelope)).unwrap();
        assert_eq!(json["to"][0]["email"], "ada@example.com");
        assert_eq!(json["from"]["name"], "MindFuel");
        assert_eq!(json["text"], "x");
    }

    #[test]
    fn empty_token_is_ignored() {
        let transport = HttpRelayTransport::new("http://relay", Some(String::new()), Duration::from_secs(1));
        assert!(transport.token.is_none());
    }
}
