//! Gateway configuration loaded from TOML

use crate::error::{GatewayError, GatewayResult};
use crate::protocol::codec::DEFAULT_MAX_LINE_BYTES;
use crate::smtp::SmtpSecurity;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding `server.auth_key`
pub const AUTH_KEY_ENV: &str = "MAILGATE_AUTH_KEY";

/// Complete gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub stream: StreamConfig,
    pub smtp: SmtpSettings,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address, `host:port`
    pub bind: String,
    /// Shared secret expected in the `X-Auth-Key` header; unset disables the check
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            auth_key: None,
        }
    }
}

/// Per-stream limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Idle heartbeat period in seconds; 0 disables heartbeats
    pub heartbeat_interval_secs: u64,
    /// Events buffered per stream before the processor waits for the client
    pub channel_capacity: usize,
    /// Longest accepted inbound line
    pub max_line_bytes: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 30,
            channel_capacity: 64,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

/// Settings applied to every outbound SMTP connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpSettings {
    /// Security used for ports other than 465
    pub security: SmtpSecurity,
    pub timeout_secs: u64,
    /// Name announced in EHLO
    pub hello_name: String,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            security: SmtpSecurity::StartTls,
            timeout_secs: 30,
            hello_name: "localhost".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from `path`, falling back to defaults if it does not exist
    pub async fn load_from_file(path: &Path) -> GatewayResult<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GatewayError::config(format!("Failed to read config: {}", e)))?;

        let config: GatewayConfig = toml::from_str(&content)
            .map_err(|e| GatewayError::config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration settings
    pub fn validate(&self) -> GatewayResult<()> {
        self.bind_addr()?;

        if self.stream.channel_capacity == 0 {
            return Err(GatewayError::config("Channel capacity must be greater than 0"));
        }

        if self.stream.max_line_bytes == 0 {
            return Err(GatewayError::config("Max line length must be greater than 0"));
        }

        if self.smtp.timeout_secs == 0 {
            return Err(GatewayError::config("SMTP timeout must be greater than 0"));
        }

        if self.smtp.hello_name.trim().is_empty() {
            return Err(GatewayError::config("SMTP hello name cannot be empty"));
        }

        if matches!(&self.server.auth_key, Some(key) if key.is_empty()) {
            return Err(GatewayError::config("Auth key cannot be empty"));
        }

        Ok(())
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_auth_key(std::env::var(AUTH_KEY_ENV).ok());
    }

    fn apply_auth_key(&mut self, key: Option<String>) {
        if let Some(key) = key.filter(|k| !k.is_empty()) {
            self.server.auth_key = Some(key);
        }
    }

    pub fn bind_addr(&self) -> GatewayResult<SocketAddr> {
        self.server
            .bind
            .parse()
            .map_err(|e| GatewayError::config(format!("Invalid bind address '{}': {}", self.server.bind, e)))
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        match self.stream.heartbeat_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Render the effective configuration, secrets included
    pub fn to_toml(&self) -> GatewayResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| GatewayError::config(format!("Failed to serialize config: {}", e)))
    }
}
