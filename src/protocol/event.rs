use crate::error::GatewayError;
use crate::session::SessionId;
use serde::{Deserialize, Serialize};

/// Connection state reported alongside a session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionKind {
    /// Connected and ready for a login
    #[serde(rename = "open")]
    Open,
    /// Logged in and ready to send
    #[serde(rename = "inuse")]
    InUse,
}

/// Machine-readable failure category carried by error events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    PreconditionFailed,
    AlreadyInState,
    TransportError,
    LoginFailed,
    SendFailed,
    DecodeError,
    UnrecognizedCommand,
    NotFound,
    InvalidRequest,
    Unauthorized,
    Internal,
}

/// Events the gateway writes to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Event {
    /// The session is reachable under `id` and is in `state`
    #[serde(rename = "SMTPServerStreamConnectionIDState")]
    ConnectionStateChanged {
        id: SessionId,
        state: ConnectionKind,
    },
    /// The session's transport is gone; no further commands will run
    #[serde(rename = "SMTPServerStreamConnectionClose")]
    ConnectionClosed,
    /// A single command or record failed; the stream stays open
    #[serde(rename = "SMTPServerStreamError")]
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<SessionId>,
        code: ErrorCode,
        message: String,
    },
    /// Server heartbeat
    #[serde(rename = "StreamKeepAlive")]
    KeepAlive {
        #[serde(rename = "keepAlive")]
        keep_alive: bool,
    },
}

impl Event {
    pub fn state_changed(id: SessionId, state: ConnectionKind) -> Self {
        Event::ConnectionStateChanged { id, state }
    }

    pub fn heartbeat() -> Self {
        Event::KeepAlive { keep_alive: true }
    }

    /// Error report for a failure attributed to `id`
    pub fn error(id: Option<SessionId>, error: &GatewayError) -> Self {
        Event::Error {
            id,
            code: error.code(),
            message: error.to_string(),
        }
    }
}

/// One outbound JSON line: `{"serverMessage": {...}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(rename = "serverMessage")]
    pub server_message: Event,
}
