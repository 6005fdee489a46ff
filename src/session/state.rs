use crate::error::{GatewayError, GatewayResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Externally visible session identifier
///
/// Reassigned on login and logout; the session behind it stays the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        SessionId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(SessionId)
    }
}

/// Connection state with the busy flag folded in, as seen by guards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Idle,
    Connected,
    Authenticated,
    Busy,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Idle => write!(f, "idle"),
            SessionPhase::Connected => write!(f, "connected"),
            SessionPhase::Authenticated => write!(f, "authenticated"),
            SessionPhase::Busy => write!(f, "busy"),
        }
    }
}

/// Connection state machine of one session
///
/// `logged_in` implies `connected`; `busy` marks a command in flight.
#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    connected: bool,
    logged_in: bool,
    busy: bool,
    closed: bool,
    last_activity: Option<DateTime<Utc>>,
    last_succeeded: Option<bool>,
    last_succeeded_at: Option<DateTime<Utc>>,
    last_failed_at: Option<DateTime<Utc>>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connection state ignoring the busy flag
    pub fn status(&self) -> SessionPhase {
        match (self.connected, self.logged_in) {
            (true, true) => SessionPhase::Authenticated,
            (true, false) => SessionPhase::Connected,
            _ => SessionPhase::Idle,
        }
    }

    /// Connection state as reported in guard failures
    pub fn phase(&self) -> SessionPhase {
        if self.busy {
            SessionPhase::Busy
        } else {
            self.status()
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Guard: not busy and exactly in `expected`
    pub fn require(&self, expected: SessionPhase) -> GatewayResult<()> {
        let actual = self.phase();
        if actual != expected {
            return Err(GatewayError::PreconditionFailed { expected, actual });
        }
        Ok(())
    }

    /// Mark a command as in flight
    pub(crate) fn begin_command(&mut self) {
        self.busy = true;
        self.last_activity = Some(Utc::now());
    }

    /// Clear the in-flight flag and record the outcome
    pub(crate) fn finish_command(&mut self, succeeded: bool) {
        let now = Utc::now();
        self.busy = false;
        self.last_succeeded = Some(succeeded);
        if succeeded {
            self.last_succeeded_at = Some(now);
        } else {
            self.last_failed_at = Some(now);
        }
    }

    pub(crate) fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
        if !connected {
            self.logged_in = false;
        }
    }

    pub(crate) fn set_logged_in(&mut self, logged_in: bool) {
        self.logged_in = logged_in && self.connected;
    }

    pub(crate) fn mark_closed(&mut self) {
        self.closed = true;
    }

    pub(crate) fn reset(&mut self) {
        self.set_connected(false);
        self.busy = false;
    }
}

/// Point-in-time view of a session for status queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub host: String,
    pub port: u16,
    pub status: SessionPhase,
    pub is_running_command: bool,
    pub is_connected: bool,
    pub is_logged_in: bool,
    pub last_command_activity: Option<DateTime<Utc>>,
    pub last_command_succeeded: Option<bool>,
    pub last_command_succeeded_date: Option<DateTime<Utc>>,
    pub last_command_failed_date: Option<DateTime<Utc>>,
}

impl SessionSnapshot {
    pub(crate) fn capture(id: SessionId, host: &str, port: u16, state: &ConnectionState) -> Self {
        Self {
            id,
            host: host.to_string(),
            port,
            status: state.status(),
            is_running_command: state.busy,
            is_connected: state.connected,
            is_logged_in: state.logged_in,
            last_command_activity: state.last_activity,
            last_command_succeeded: state.last_succeeded,
            last_command_succeeded_date: state.last_succeeded_at,
            last_command_failed_date: state.last_failed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        let mut state = ConnectionState::new();
        assert_eq!(state.status(), SessionPhase::Idle);

        state.set_connected(true);
        assert_eq!(state.status(), SessionPhase::Connected);

        state.set_logged_in(true);
        assert_eq!(state.status(), SessionPhase::Authenticated);

        state.set_connected(false);
        assert_eq!(state.status(), SessionPhase::Idle);
        assert!(!state.is_logged_in());
    }

    #[test]
    fn test_login_requires_connection() {
        let mut state = ConnectionState::new();
        state.set_logged_in(true);
        assert!(!state.is_logged_in());
    }

    #[test]
    fn test_busy_fails_every_guard() {
        let mut state = ConnectionState::new();
        state.set_connected(true);
        state.begin_command();

        match state.require(SessionPhase::Connected) {
            Err(GatewayError::PreconditionFailed { expected, actual }) => {
                assert_eq!(expected, SessionPhase::Connected);
                assert_eq!(actual, SessionPhase::Busy);
            }
            other => panic!("Expected precondition failure, got {:?}", other),
        }

        state.finish_command(true);
        assert!(state.require(SessionPhase::Connected).is_ok());
    }

    #[test]
    fn test_outcome_timestamps() {
        let mut state = ConnectionState::new();
        state.begin_command();
        state.finish_command(false);

        let snapshot = SessionSnapshot::capture(SessionId::new(), "smtp.example.com", 587, &state);
        assert_eq!(snapshot.last_command_succeeded, Some(false));
        assert!(snapshot.last_command_failed_date.is_some());
        assert!(snapshot.last_command_succeeded_date.is_none());
        assert!(snapshot.last_command_activity.is_some());
        assert!(!snapshot.is_running_command);
    }

    #[test]
    fn test_session_id_parse() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<SessionId>().is_err());
    }
}
