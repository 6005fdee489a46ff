use crate::config::SmtpSettings;
use crate::protocol::SimpleEmail;
use crate::smtp::{build_message, MailTransport, SendResult, SmtpError, SmtpResult, SmtpSecurity, TransportFactory};
use async_trait::async_trait;
use lettre::transport::smtp::{
    authentication::{Credentials, Mechanism},
    client::{AsyncSmtpConnection, TlsParameters},
    extension::ClientId,
};
use std::time::Duration;

/// SMTP client configuration
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub security: SmtpSecurity,
    pub timeout: Duration,
    pub hello_name: String,
}

impl SmtpConfig {
    pub fn new(server: String, port: u16) -> Self {
        Self {
            server,
            port,
            security: SmtpSecurity::StartTls.for_port(port),
            timeout: Duration::from_secs(30),
            hello_name: "localhost".to_string(),
        }
    }

    pub fn with_security(mut self, security: SmtpSecurity) -> Self {
        self.security = security;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_hello_name(mut self, hello_name: String) -> Self {
        self.hello_name = hello_name;
        self
    }
}

/// Mail transport backed by a single lettre SMTP connection
///
/// Unlike the pooled `AsyncSmtpTransport`, this keeps the connection open
/// between commands so login state survives until `disconnect`.
pub struct LettreTransport {
    config: SmtpConfig,
    connection: Option<AsyncSmtpConnection>,
}

impl LettreTransport {
    pub fn new(config: SmtpConfig) -> Self {
        Self {
            config,
            connection: None,
        }
    }

    fn client_id(&self) -> ClientId {
        ClientId::Domain(self.config.hello_name.clone())
    }

    fn tls_parameters(&self) -> SmtpResult<TlsParameters> {
        TlsParameters::builder(self.config.server.clone())
            .dangerous_accept_invalid_certs(false)
            .dangerous_accept_invalid_hostnames(false)
            .build()
            .map_err(|e| SmtpError::ConnectionFailed(format!("TLS configuration failed: {}", e)))
    }

    fn connection(&mut self) -> SmtpResult<&mut AsyncSmtpConnection> {
        self.connection.as_mut().ok_or(SmtpError::NotConnected)
    }
}

#[async_trait]
impl MailTransport for LettreTransport {
    async fn connect(&mut self) -> SmtpResult<()> {
        if self.connection.is_some() {
            return Err(SmtpError::ConnectionFailed("Connection already open".to_string()));
        }

        let hello = self.client_id();
        let implicit_tls = match self.config.security {
            SmtpSecurity::Tls => Some(self.tls_parameters()?),
            SmtpSecurity::None | SmtpSecurity::StartTls => None,
        };

        tracing::debug!(
            host = %self.config.server,
            port = self.config.port,
            security = ?self.config.security,
            "Opening SMTP connection"
        );

        let mut connection = AsyncSmtpConnection::connect_tokio1(
            (self.config.server.as_str(), self.config.port),
            Some(self.config.timeout),
            &hello,
            implicit_tls,
            None,
        )
        .await
        .map_err(|e| SmtpError::ConnectionFailed(e.to_string()))?;

        if self.config.security == SmtpSecurity::StartTls && connection.can_starttls() {
            let tls_parameters = self.tls_parameters()?;
            connection
                .starttls(tls_parameters, &hello)
                .await
                .map_err(|e| SmtpError::ConnectionFailed(format!("STARTTLS failed: {}", e)))?;
        }

        self.connection = Some(connection);
        Ok(())
    }

    async fn login(&mut self, username: &str, password: &str) -> SmtpResult<()> {
        let credentials = Credentials::new(username.to_string(), password.to_string());
        self.connection()?
            .auth(&[Mechanism::Plain, Mechanism::Login], &credentials)
            .await
            .map_err(|e| SmtpError::AuthenticationFailed(e.to_string()))?;
        Ok(())
    }

    async fn disconnect(&mut self) -> SmtpResult<()> {
        let Some(mut connection) = self.connection.take() else {
            return Ok(());
        };

        if let Err(e) = connection.quit().await {
            connection.abort().await;
            return Err(SmtpError::ConnectionFailed(format!("QUIT failed: {}", e)));
        }
        Ok(())
    }

    async fn send_email(&mut self, email: &SimpleEmail) -> SmtpResult<SendResult> {
        let message = build_message(email)?;
        let envelope = message.envelope().clone();
        let message_id = message
            .headers()
            .get_raw("Message-ID")
            .map(|h| h.to_string())
            .unwrap_or_else(|| format!("<{}@{}>", uuid::Uuid::new_v4(), self.config.server));
        let accepted_recipients: Vec<String> = envelope.to().iter().map(|addr| addr.to_string()).collect();

        let response = self
            .connection()?
            .send(&envelope, &message.formatted())
            .await
            .map_err(|e| SmtpError::SendFailed(e.to_string()))?;

        tracing::debug!(
            "Email sent: {} to {} recipients ({})",
            message_id,
            accepted_recipients.len(),
            response.code()
        );

        Ok(SendResult {
            message_id,
            accepted_recipients,
            sent_at: chrono::Utc::now(),
        })
    }
}

/// Creates lettre transports using the gateway's SMTP settings
#[derive(Debug, Clone)]
pub struct LettreTransportFactory {
    settings: SmtpSettings,
}

impl LettreTransportFactory {
    pub fn new(settings: SmtpSettings) -> Self {
        Self { settings }
    }

    /// Connection configuration for one session
    pub fn config_for(&self, host: &str, port: u16) -> SmtpConfig {
        SmtpConfig::new(host.to_string(), port)
            .with_security(self.settings.security.for_port(port))
            .with_timeout(Duration::from_secs(self.settings.timeout_secs))
            .with_hello_name(self.settings.hello_name.clone())
    }
}

impl TransportFactory for LettreTransportFactory {
    fn create(&self, host: &str, port: u16) -> Box<dyn MailTransport> {
        Box::new(LettreTransport::new(self.config_for(host, port)))
    }
}
