pub mod client;
pub mod message;
pub mod mock;
pub mod transport;

pub use client::{LettreTransport, LettreTransportFactory, SmtpConfig};
pub use message::{build_message, MessageBuilder};
pub use transport::{MailTransport, TransportFactory};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// SMTP-related errors
#[derive(Error, Debug)]
pub enum SmtpError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    #[error("Message formatting error: {0}")]
    MessageFormatError(String),

    #[error("Message build error: {0}")]
    MessageBuildError(#[from] lettre::error::Error),
}

pub type SmtpResult<T> = Result<T, SmtpError>;

/// SMTP connection security
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// No encryption (not recommended)
    None,
    /// STARTTLS (opportunistic encryption)
    StartTls,
    /// Direct TLS connection
    Tls,
}

impl Default for SmtpSecurity {
    fn default() -> Self {
        SmtpSecurity::StartTls
    }
}

impl SmtpSecurity {
    /// Port 465 only speaks implicit TLS
    pub fn for_port(self, port: u16) -> Self {
        if port == 465 {
            SmtpSecurity::Tls
        } else {
            self
        }
    }
}

/// Send result information
#[derive(Debug, Clone)]
pub struct SendResult {
    pub message_id: String,
    pub accepted_recipients: Vec<String>,
    pub sent_at: chrono::DateTime<chrono::Utc>,
}
