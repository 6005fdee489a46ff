//! Sequential dispatch of inbound commands to a session

use crate::error::GatewayError;
use crate::protocol::{Command, ConnectionKind, DecodeError, Event, SimpleEmail};
use crate::session::registry::SessionRegistry;
use crate::session::session::Session;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Why a processor stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamExit {
    /// The request body ended
    InboundClosed,
    /// The client sent `StreamKeepAlive{keepAlive: false}`
    ClientRequested,
    /// Login or logout failed and the session was closed
    SessionClosed,
    /// The inbound framing broke
    Framing,
    /// Nobody is reading events any more
    Disconnected,
}

enum Flow {
    Continue,
    Stop(StreamExit),
}

/// Runs one stream's commands against its session, one at a time
pub struct CommandProcessor {
    session: Arc<Session>,
    registry: SessionRegistry,
    heartbeat: Option<Duration>,
}

impl CommandProcessor {
    pub fn new(session: Arc<Session>, registry: SessionRegistry, heartbeat: Option<Duration>) -> Self {
        Self {
            session,
            registry,
            heartbeat,
        }
    }

    /// Consume `commands` until the stream ends or the session is done.
    ///
    /// Each command completes before the next is pulled. When idle, a
    /// heartbeat event is emitted every `heartbeat` interval. The session's
    /// event channel is finished on return.
    pub async fn run<S>(self, commands: S) -> StreamExit
    where
        S: Stream<Item = Result<Command, DecodeError>> + Send,
    {
        let mut commands = Box::pin(commands);
        let mut ticker = self.heartbeat.map(|period| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        let exit = loop {
            let next = match ticker.as_mut() {
                Some(ticker) => tokio::select! {
                    next = commands.next() => next,
                    _ = ticker.tick() => {
                        tracing::debug!(host = self.session.host(), "Heartbeat");
                        if !self.session.emit(Event::heartbeat()).await {
                            break StreamExit::Disconnected;
                        }
                        continue;
                    }
                },
                None => commands.next().await,
            };

            let flow = match next {
                None => Flow::Stop(StreamExit::InboundClosed),
                Some(Err(e)) => self.handle_decode_error(e).await,
                Some(Ok(command)) => self.dispatch(command).await,
            };

            if let Flow::Stop(exit) = flow {
                break exit;
            }
        };

        self.session.finish_events().await;
        tracing::debug!(host = self.session.host(), ?exit, "Command processor stopped");
        exit
    }

    async fn dispatch(&self, command: Command) -> Flow {
        let id = self.session.id().await;
        tracing::debug!(session = %id, command = command.kind(), "Dispatching command");

        match command {
            Command::Login { username, password } => self.handle_login(&username, &password).await,
            Command::Logout => self.handle_logout().await,
            Command::SendEmail(email) => self.handle_send(&email).await,
            Command::KeepAlive { keep_alive: true } => Flow::Continue,
            Command::KeepAlive { keep_alive: false } => Flow::Stop(StreamExit::ClientRequested),
        }
    }

    async fn handle_login(&self, username: &str, password: &str) -> Flow {
        match self.session.login(username, password).await {
            Ok(()) => self.announce(ConnectionKind::InUse).await,
            Err(e) => self.handle_failure(e).await,
        }
    }

    async fn handle_logout(&self) -> Flow {
        match self.session.logout().await {
            Ok(()) => self.announce(ConnectionKind::Open).await,
            Err(e) => self.handle_failure(e).await,
        }
    }

    async fn handle_send(&self, email: &SimpleEmail) -> Flow {
        match self.session.send(email).await {
            Ok(result) => {
                let id = self.session.id().await;
                tracing::info!(
                    session = %id,
                    message_id = %result.message_id,
                    recipients = result.accepted_recipients.len(),
                    "Email sent"
                );
                Flow::Continue
            }
            Err(e @ GatewayError::NotFound(_)) => self.handle_failure(e).await,
            Err(e) => {
                let id = self.session.id().await;
                tracing::warn!(session = %id, "Send rejected: {}", e);
                self.report(&e).await
            }
        }
    }

    /// Publish the session under a fresh identifier
    async fn announce(&self, state: ConnectionKind) -> Flow {
        let old_id = self.session.id().await;
        match self.registry.reassign(&old_id).await {
            Ok(new_id) => {
                if self.session.emit(Event::state_changed(new_id, state)).await {
                    Flow::Continue
                } else {
                    Flow::Stop(StreamExit::Disconnected)
                }
            }
            Err(e) => self.handle_failure(e).await,
        }
    }

    /// Ordering violations are reported; anything else closes the session.
    async fn handle_failure(&self, error: GatewayError) -> Flow {
        let id = self.session.id().await;
        if error.is_protocol_violation() {
            tracing::warn!(session = %id, "Command rejected: {}", error);
            return self.report(&error).await;
        }

        tracing::error!(session = %id, "Closing session: {}", error);
        self.session.emit(Event::ConnectionClosed).await;
        Flow::Stop(StreamExit::SessionClosed)
    }

    async fn handle_decode_error(&self, error: DecodeError) -> Flow {
        let fatal = error.is_fatal();
        let error = GatewayError::from(error);
        let id = self.session.id().await;
        tracing::warn!(session = %id, "Inbound record rejected: {}", error);

        let flow = self.report(&error).await;
        if fatal {
            Flow::Stop(StreamExit::Framing)
        } else {
            flow
        }
    }

    async fn report(&self, error: &GatewayError) -> Flow {
        let id = self.session.id().await;
        if self.session.emit(Event::error(Some(id), error)).await {
            Flow::Continue
        } else {
            Flow::Stop(StreamExit::Disconnected)
        }
    }
}
