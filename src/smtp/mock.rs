//! Scripted mail transport for exercising sessions without a network

use crate::protocol::SimpleEmail;
use crate::smtp::{MailTransport, SendResult, SmtpError, SmtpResult, TransportFactory};
use async_trait::async_trait;
use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Record of a call made to a mock transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Connect { host: String, port: u16 },
    Login { username: String },
    Disconnect,
    SendEmail { subject: String, recipients: usize },
}

/// Failure injection for mock transports
#[derive(Debug, Clone, Default)]
pub struct MockBehavior {
    /// Connect attempts numbered from this index onwards fail (0-based,
    /// counted across every transport of the factory)
    pub fail_connect_from: Option<usize>,
    pub fail_login: bool,
    pub fail_send: bool,
    pub fail_disconnect: bool,
    /// Simulated duration of every call
    pub latency: Duration,
}

impl MockBehavior {
    pub fn failing_connect() -> Self {
        Self {
            fail_connect_from: Some(0),
            ..Self::default()
        }
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct MockState {
    behavior: RwLock<MockBehavior>,
    calls: RwLock<Vec<TransportCall>>,
    connect_attempts: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    open_connections: AtomicIsize,
}

impl MockState {
    /// Record `call` and wait out the latency. The returned guard keeps the
    /// call counted as in flight until it is dropped, even if the caller is
    /// cancelled mid-call.
    async fn enter(&self, call: TransportCall) -> (InFlight<'_>, MockBehavior) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(self);
        self.calls.write().await.push(call);

        let behavior = self.behavior.read().await.clone();
        if !behavior.latency.is_zero() {
            tokio::time::sleep(behavior.latency).await;
        }
        (guard, behavior)
    }
}

struct InFlight<'a>(&'a MockState);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Factory handing out mock transports that share one call log
#[derive(Clone, Default)]
pub struct MockTransportFactory {
    state: Arc<MockState>,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: MockBehavior) -> Self {
        let factory = Self::new();
        if let Ok(mut current) = factory.state.behavior.try_write() {
            *current = behavior;
        }
        factory
    }

    /// Update behavior for subsequent calls
    pub async fn set_behavior(&self, behavior: MockBehavior) {
        *self.state.behavior.write().await = behavior;
    }

    /// Every call made so far, in order
    pub async fn calls(&self) -> Vec<TransportCall> {
        self.state.calls.read().await.clone()
    }

    /// Number of recorded calls matching `predicate`
    pub async fn count(&self, predicate: impl Fn(&TransportCall) -> bool) -> usize {
        self.state.calls.read().await.iter().filter(|c| predicate(c)).count()
    }

    /// Calls currently in progress
    pub fn in_flight(&self) -> usize {
        self.state.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were in progress at the same instant
    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    /// Connections opened and not yet closed
    pub fn open_connections(&self) -> isize {
        self.state.open_connections.load(Ordering::SeqCst)
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(&self, host: &str, port: u16) -> Box<dyn MailTransport> {
        Box::new(MockTransport {
            host: host.to_string(),
            port,
            connected: false,
            state: self.state.clone(),
        })
    }
}

/// In-memory transport created by [`MockTransportFactory`]
pub struct MockTransport {
    host: String,
    port: u16,
    connected: bool,
    state: Arc<MockState>,
}

#[async_trait]
impl MailTransport for MockTransport {
    async fn connect(&mut self) -> SmtpResult<()> {
        let (_call, behavior) = self
            .state
            .enter(TransportCall::Connect {
                host: self.host.clone(),
                port: self.port,
            })
            .await;
        let attempt = self.state.connect_attempts.fetch_add(1, Ordering::SeqCst);

        match behavior.fail_connect_from {
            Some(from) if attempt >= from => Err(SmtpError::ConnectionFailed(format!(
                "{}:{} refused the connection",
                self.host, self.port
            ))),
            _ => {
                self.connected = true;
                self.state.open_connections.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    async fn login(&mut self, username: &str, _password: &str) -> SmtpResult<()> {
        let (_call, behavior) = self
            .state
            .enter(TransportCall::Login {
                username: username.to_string(),
            })
            .await;

        if !self.connected {
            Err(SmtpError::NotConnected)
        } else if behavior.fail_login {
            Err(SmtpError::AuthenticationFailed("535 invalid credentials".to_string()))
        } else {
            Ok(())
        }
    }

    async fn disconnect(&mut self) -> SmtpResult<()> {
        let (_call, behavior) = self.state.enter(TransportCall::Disconnect).await;

        if self.connected {
            self.connected = false;
            self.state.open_connections.fetch_sub(1, Ordering::SeqCst);
        }
        if behavior.fail_disconnect {
            Err(SmtpError::ConnectionFailed("QUIT failed".to_string()))
        } else {
            Ok(())
        }
    }

    async fn send_email(&mut self, email: &SimpleEmail) -> SmtpResult<SendResult> {
        let (_call, behavior) = self
            .state
            .enter(TransportCall::SendEmail {
                subject: email.subject.clone(),
                recipients: email.all_recipients().count(),
            })
            .await;

        if !self.connected {
            Err(SmtpError::NotConnected)
        } else if behavior.fail_send {
            Err(SmtpError::SendFailed("554 transaction failed".to_string()))
        } else {
            Ok(SendResult {
                message_id: format!("<{}@{}>", uuid::Uuid::new_v4(), self.host),
                accepted_recipients: email.all_recipients().map(|a| a.address.clone()).collect(),
                sent_at: chrono::Utc::now(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_aborted_call_leaves_flight() {
        let factory = MockTransportFactory::with_behavior(MockBehavior::with_latency(Duration::from_millis(50)));
        let mut transport = factory.create("smtp.example.com", 587);

        let pending = tokio::spawn(async move {
            let _ = transport.connect().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(factory.in_flight(), 1);
        pending.abort();
        assert!(pending.await.unwrap_err().is_cancelled());
        assert_eq!(factory.in_flight(), 0);

        let mut transport = factory.create("smtp.example.com", 587);
        transport.connect().await.unwrap();
        assert_eq!(factory.max_in_flight(), 1);
        assert_eq!(factory.open_connections(), 1);
    }
}
