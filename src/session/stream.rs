//! Wiring of one client stream: session, processor and publisher

use crate::error::{GatewayError, GatewayResult};
use crate::protocol::{Command, ConnectionKind, DecodeError, Event};
use crate::session::processor::CommandProcessor;
use crate::session::publisher::{publish, EventStream, Termination};
use crate::session::registry::SessionRegistry;
use crate::session::session::Session;
use crate::session::state::SessionId;
use futures::Stream;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Per-stream settings
#[derive(Debug, Clone, Default)]
pub struct StreamOptions {
    /// Idle heartbeat period; `None` disables heartbeats
    pub heartbeat: Option<Duration>,
}

/// A running stream
pub struct OpenStream {
    /// Identifier announced in the initial `open` event
    pub id: SessionId,
    pub session: Arc<Session>,
    /// Body for the client response
    pub events: EventStream,
    /// Resolves after the session has been released
    pub supervisor: JoinHandle<Termination>,
}

/// Create a session for `host:port` and start serving `commands` against it.
///
/// The first event on the returned stream announces the session as `open`.
/// Whether the client drops the stream or it runs to completion, the
/// supervisor removes the session from `registry` and releases its
/// transport exactly once.
///
/// Setup runs on its own task. If this future is dropped before it
/// resolves, the stream it would have returned is dropped as cancelled and
/// the session is released all the same.
pub async fn open_stream<S>(
    registry: &SessionRegistry,
    host: &str,
    port: u16,
    commands: S,
    options: &StreamOptions,
) -> GatewayResult<OpenStream>
where
    S: Stream<Item = Result<Command, DecodeError>> + Send + 'static,
{
    let registry = registry.clone();
    let host = host.to_string();
    let options = options.clone();
    tokio::spawn(async move { start_stream(registry, host, port, commands, options).await }).await?
}

async fn start_stream<S>(
    registry: SessionRegistry,
    host: String,
    port: u16,
    commands: S,
    options: StreamOptions,
) -> GatewayResult<OpenStream>
where
    S: Stream<Item = Result<Command, DecodeError>> + Send + 'static,
{
    let (id, session) = registry.create(&host, port).await?;

    let receiver = match session.take_event_receiver().await {
        Some(receiver) => receiver,
        None => {
            registry.release(&session).await;
            return Err(GatewayError::NotFound(id));
        }
    };
    let (events, mut signal) = publish(receiver);
    session.emit(Event::state_changed(id, ConnectionKind::Open)).await;

    let processor = CommandProcessor::new(session.clone(), registry.clone(), options.heartbeat);
    let mut processor = tokio::spawn(processor.run(commands));

    let supervisor = {
        let session = session.clone();
        tokio::spawn(async move {
            let termination = tokio::select! {
                termination = signal.wait() => {
                    if termination == Termination::Cancelled {
                        processor.abort();
                    }
                    let _ = (&mut processor).await;
                    registry.release(&session).await;
                    termination
                }
                exit = &mut processor => {
                    let id = session.id().await;
                    match exit {
                        Ok(exit) => tracing::debug!(session = %id, ?exit, "Inbound side finished"),
                        Err(e) => tracing::error!(session = %id, "Command processor failed: {}", e),
                    }
                    // Releasing closes the event sender so the client sees the
                    // end of the body. The entry must not wait on the client.
                    registry.release(&session).await;
                    signal.wait().await
                }
            };

            tracing::info!(host = session.host(), ?termination, "Stream ended");
            termination
        })
    };

    Ok(OpenStream {
        id,
        session,
        events,
        supervisor,
    })
}
