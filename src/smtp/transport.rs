//! Boundary between sessions and the SMTP wire protocol

use crate::protocol::SimpleEmail;
use crate::smtp::{SendResult, SmtpResult};
use async_trait::async_trait;

/// One live SMTP connection owned by a session
///
/// Calls are issued strictly one at a time by the owning session. Any of
/// them may fail; none of them retries on its own.
#[async_trait]
pub trait MailTransport: Send {
    /// Open the connection and complete the greeting
    async fn connect(&mut self) -> SmtpResult<()>;

    /// Authenticate on the open connection
    async fn login(&mut self, username: &str, password: &str) -> SmtpResult<()>;

    /// Close the connection
    async fn disconnect(&mut self) -> SmtpResult<()>;

    /// Deliver one message on the authenticated connection
    async fn send_email(&mut self, email: &SimpleEmail) -> SmtpResult<SendResult>;
}

/// Builds an unconnected transport for a host and port
pub trait TransportFactory: Send + Sync {
    fn create(&self, host: &str, port: u16) -> Box<dyn MailTransport>;
}
