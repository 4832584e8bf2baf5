//! Per-recipient delivery with retry, backoff and rate limiting.
//!
//! The engine never touches the backing store; it turns a batch into outcomes.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use mindfuel_core::{Batch, Content, DeliveryOutcome, Recipient};

use crate::render::Renderer;
use crate::retry::RetryPolicy;
use crate::transport::{Envelope, Session, Transport, TransportError, validate_address};

/// Who messages are sent as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderIdentity {
    pub address: String,
    pub name: String,
    pub subject: String,
}

#[derive(Debug, Clone)]
pub struct DeliveryPolicy {
    /// Applied per recipient, and to opening the batch session.
    pub retry: RetryPolicy,
    /// Pause after every recipient, successful or not.
    pub inter_send_delay: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            inter_send_delay: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    /// No session could be opened for the batch; nothing was sent.
    #[error("transport session unavailable after {attempts} attempts: {source}")]
    SessionUnavailable {
        attempts: u32,
        #[source]
        source: TransportError,
    },
}

pub struct DeliveryEngine<T, R> {
    transport: T,
    renderer: R,
    sender: SenderIdentity,
    policy: DeliveryPolicy,
}

impl<T: Transport, R: Renderer> DeliveryEngine<T, R> {
    pub fn new(transport: T, renderer: R, sender: SenderIdentity, policy: DeliveryPolicy) -> Self {
        Self {
            transport,
            renderer,
            sender,
            policy,
        }
    }

    /// Deliver to every recipient of `batch` in ascending id order.
    ///
    /// Returns one outcome per recipient. Recipient-level failures are
    /// outcomes, not errors; only a session that cannot be opened at all
    /// fails the batch.
    pub async fn deliver_batch(
        &self,
        batch: &Batch,
        content: &Content,
    ) -> Result<Vec<DeliveryOutcome>, DeliveryError> {
        self.deliver_batch_with(batch, content, |_| {}).await
    }

    /// Like [`deliver_batch`](Self::deliver_batch), calling `on_outcome` as
    /// each recipient finishes.
    pub async fn deliver_batch_with(
        &self,
        batch: &Batch,
        content: &Content,
        mut on_outcome: impl FnMut(&DeliveryOutcome),
    ) -> Result<Vec<DeliveryOutcome>, DeliveryError> {
        let mut session = Some(self.open_session_with_retry().await?);
        let mut outcomes = Vec::with_capacity(batch.len());

        for recipient in batch.recipients() {
            let outcome = self.deliver_one(&mut session, recipient, content).await;
            on_outcome(&outcome);
            outcomes.push(outcome);
            tokio::time::sleep(self.policy.inter_send_delay).await;
        }

        if let Some(session) = session {
            session.close().await;
        }
        Ok(outcomes)
    }

    async fn open_session_with_retry(&self) -> Result<Box<dyn Session>, DeliveryError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.transport.open_session().await {
                Ok(session) => return Ok(session),
                Err(e) if self.policy.retry.should_retry(attempt) => {
                    let wait = self.policy.retry.delay_for_attempt(attempt);
                    warn!(attempt, error = %e, wait_ms = wait.as_millis() as u64, "opening transport session failed, retrying");
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    error!(attempts = attempt, error = %e, "transport session unavailable");
                    return Err(DeliveryError::SessionUnavailable {
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        }
    }

    async fn deliver_one(
        &self,
        session: &mut Option<Box<dyn Session>>,
        recipient: &Recipient,
        content: &Content,
    ) -> DeliveryOutcome {
        let id = recipient.id;
        if let Err(e) = validate_address(&recipient.address) {
            warn!(recipient_id = %id, error = %e, "skipping recipient with invalid address");
            return DeliveryOutcome::failed(id, 0, e.to_string());
        }

        let envelope = self.envelope_for(recipient, content);
        let retry = &self.policy.retry;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match self.send_on(session, &envelope).await {
                Ok(()) => {
                    info!(recipient_id = %id, attempt, "email sent");
                    return DeliveryOutcome::sent(id, attempt);
                }
                Err(err) => err,
            };

            if err.is_session_lost() {
                if let Some(dropped) = session.take() {
                    dropped.close().await;
                }
            }

            if !err.is_retryable() {
                error!(recipient_id = %id, attempt, error = %err, "recipient rejected permanently");
                return DeliveryOutcome::failed(id, attempt, err.to_string());
            }
            if !retry.should_retry(attempt) {
                error!(recipient_id = %id, attempts = attempt, error = %err, "delivery failed after all attempts");
                return DeliveryOutcome::failed(id, attempt, err.to_string());
            }

            let wait = retry.delay_for_attempt(attempt);
            warn!(
                recipient_id = %id,
                attempt,
                max_attempts = retry.max_attempts,
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "send failed, retrying"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Send on the held session, re-opening it first if it was dropped.
    async fn send_on(
        &self,
        session: &mut Option<Box<dyn Session>>,
        envelope: &Envelope,
    ) -> Result<(), TransportError> {
        if session.is_none() {
            let reopened = self.transport.open_session().await?;
            debug!(to = %envelope.to, "transport session re-established");
            *session = Some(reopened);
        }
        match session.as_mut() {
            Some(active) => active.send(envelope).await,
            None => Err(TransportError::Connect("no transport session".to_string())),
        }
    }

    fn envelope_for(&self, recipient: &Recipient, content: &Content) -> Envelope {
        let rendered = self.renderer.render(recipient, content);
        Envelope {
            to: recipient.address.clone(),
            to_name: recipient.name.clone(),
            from: self.sender.address.clone(),
            from_name: self.sender.name.clone(),
            subject: self.sender.subject.clone(),
            html: rendered.html,
            text: rendered.text,
        }
    }
}
