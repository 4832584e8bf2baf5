use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::Instant;

use super::{Envelope, Session, Transport, TransportError};

/// One recorded `send` call.
#[derive(Debug, Clone)]
pub struct SendAttempt {
    pub to: String,
    pub session: u64,
    pub at: Instant,
    pub result: Result<(), TransportError>,
}

#[derive(Debug, Default)]
struct State {
    scripted: HashMap<String, VecDeque<TransportError>>,
    always_fail: HashMap<String, TransportError>,
    refuse_sessions: u32,
    attempts: Vec<SendAttempt>,
    delivered: Vec<Envelope>,
    sessions_opened: u64,
    sessions_closed: u64,
}

/// In-memory transport.
///
/// Intended for tests/dev. Failures are scripted per recipient address and
/// every attempt is recorded with a tokio `Instant`, so timing assertions
/// work under paused time.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTransport {
    state: Arc<Mutex<State>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next sends to `address` with `errors`, in order.
    pub fn script_failures(
        &self,
        address: impl Into<String>,
        errors: impl IntoIterator<Item = TransportError>,
    ) {
        self.state
            .lock()
            .scripted
            .entry(address.into())
            .or_default()
            .extend(errors);
    }

    /// Fail every send to `address` with `error`.
    pub fn fail_always(&self, address: impl Into<String>, error: TransportError) {
        self.state.lock().always_fail.insert(address.into(), error);
    }

    /// Refuse the next `count` session opens.
    pub fn refuse_sessions(&self, count: u32) {
        self.state.lock().refuse_sessions = count;
    }

    pub fn attempts(&self) -> Vec<SendAttempt> {
        self.state.lock().attempts.clone()
    }

    pub fn attempts_to(&self, address: &str) -> Vec<SendAttempt> {
        self.state
            .lock()
            .attempts
            .iter()
            .filter(|a| a.to == address)
            .cloned()
            .collect()
    }

    pub fn delivered(&self) -> Vec<Envelope> {
        self.state.lock().delivered.clone()
    }

    pub fn delivered_to(&self) -> Vec<String> {
        self.state.lock().delivered.iter().map(|e| e.to.clone()).collect()
    }

    pub fn sessions_opened(&self) -> u64 {
        self.state.lock().sessions_opened
    }

    pub fn sessions_closed(&self) -> u64 {
        self.state.lock().sessions_closed
    }
}

#[async_trait::async_trait]
impl Transport for InMemoryTransport {
    async fn open_session(&self) -> Result<Box<dyn Session>, TransportError> {
        let mut state = self.state.lock();
        if state.refuse_sessions > 0 {
            state.refuse_sessions -= 1;
            return Err(TransportError::Connect("session refused".to_string()));
        }
        state.sessions_opened += 1;
        Ok(Box::new(InMemorySession {
            id: state.sessions_opened,
            state: self.state.clone(),
        }))
    }
}

struct InMemorySession {
    id: u64,
    state: Arc<Mutex<State>>,
}

#[async_trait::async_trait]
impl Session for InMemorySession {
    async fn send(&mut self, envelope: &Envelope) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        let scripted = state
            .scripted
            .get_mut(&envelope.to)
            .and_then(VecDeque::pop_front);
        let result = match scripted.or_else(|| state.always_fail.get(&envelope.to).cloned()) {
            Some(err) => Err(err),
            None => Ok(()),
        };

        state.attempts.push(SendAttempt {
            to: envelope.to.clone(),
            session: self.id,
            at: Instant::now(),
            result: result.clone(),
        });
        if result.is_ok() {
            state.delivered.push(envelope.clone());
        }
        result
    }

    async fn close(self: Box<Self>) {
        self.state.lock().sessions_closed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(to: &str) -> Envelope {
        Envelope {
            to: to.to_string(),
            to_name: "x".to_string(),
            from: "from@example.com".to_string(),
            from_name: "MindFuel".to_string(),
            subject: "s".to_string(),
            html: String::new(),
            text: String::new(),
        }
    }

    #[tokio::test]
    async fn scripted_failures_are_consumed_in_order() {
        let transport = InMemoryTransport::new();
        transport.script_failures("a@example.com", [TransportError::Transient("busy".into())]);

        let mut session = transport.open_session().await.unwrap();
        assert!(session.send(&envelope("a@example.com")).await.is_err());
        assert!(session.send(&envelope("a@example.com")).await.is_ok());
        session.close().await;

        assert_eq!(transport.attempts_to("a@example.com").len(), 2);
        assert_eq!(transport.delivered_to(), vec!["a@example.com".to_string()]);
        assert_eq!(transport.sessions_closed(), 1);
    }

    #[tokio::test]
    async fn refused_sessions_count_down() {
        let transport = InMemoryTransport::new();
        transport.refuse_sessions(1);
        assert!(transport.open_session().await.is_err());
        assert!(transport.open_session().await.is_ok());
        assert_eq!(transport.sessions_opened(), 1);
    }
}
