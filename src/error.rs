use crate::protocol::{DecodeError, ErrorCode};
use crate::session::{SessionId, SessionPhase};
use crate::smtp::SmtpError;
use std::io;
use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Gateway errors
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Command issued in a state that does not allow it
    #[error("Precondition failed: expected {expected}, found {actual}")]
    PreconditionFailed {
        expected: SessionPhase,
        actual: SessionPhase,
    },

    /// Duplicate login or logout
    #[error("Session is already {0}")]
    AlreadyInState(SessionPhase),

    /// Connect or disconnect failed
    #[error("Transport error: {0}")]
    Transport(#[source] SmtpError),

    #[error("Login failed: {0}")]
    LoginFailed(#[source] SmtpError),

    #[error("Send failed: {0}")]
    SendFailed(#[source] SmtpError),

    /// Inbound record could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Unknown or expired session identifier
    #[error("Session not found: {0}")]
    NotFound(SessionId),

    /// Stream setup parameters were rejected
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A spawned task panicked or was cancelled
    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl GatewayError {
    pub fn invalid_request<S: Into<String>>(msg: S) -> Self {
        GatewayError::InvalidRequest(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        GatewayError::Config(msg.into())
    }

    /// Code reported to the client in error events
    pub fn code(&self) -> ErrorCode {
        match self {
            GatewayError::PreconditionFailed { .. } => ErrorCode::PreconditionFailed,
            GatewayError::AlreadyInState(_) => ErrorCode::AlreadyInState,
            GatewayError::Transport(_) => ErrorCode::TransportError,
            GatewayError::LoginFailed(_) => ErrorCode::LoginFailed,
            GatewayError::SendFailed(_) => ErrorCode::SendFailed,
            GatewayError::Decode(DecodeError::UnrecognizedCommand(_)) => ErrorCode::UnrecognizedCommand,
            GatewayError::Decode(_) => ErrorCode::DecodeError,
            GatewayError::NotFound(_) => ErrorCode::NotFound,
            GatewayError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            GatewayError::Config(_) | GatewayError::Io(_) | GatewayError::Task(_) => ErrorCode::Internal,
        }
    }

    /// Ordering violations: reported back, never fatal to the stream
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            GatewayError::PreconditionFailed { .. } | GatewayError::AlreadyInState(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let unrecognized = GatewayError::from(DecodeError::UnrecognizedCommand("X".to_string()));
        assert_eq!(unrecognized.code(), ErrorCode::UnrecognizedCommand);

        let malformed = GatewayError::from(DecodeError::malformed("eof"));
        assert_eq!(malformed.code(), ErrorCode::DecodeError);

        let send = GatewayError::SendFailed(SmtpError::SendFailed("550".to_string()));
        assert_eq!(send.code(), ErrorCode::SendFailed);
        assert!(!send.is_protocol_violation());
    }

    #[test]
    fn test_precondition_message() {
        let err = GatewayError::PreconditionFailed {
            expected: SessionPhase::Authenticated,
            actual: SessionPhase::Connected,
        };
        assert!(err.is_protocol_violation());
        assert_eq!(
            err.to_string(),
            "Precondition failed: expected authenticated, found connected"
        );
    }
}
