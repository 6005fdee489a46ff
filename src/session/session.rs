use crate::error::{GatewayError, GatewayResult};
use crate::protocol::{Event, SimpleEmail};
use crate::session::state::{ConnectionState, SessionId, SessionPhase, SessionSnapshot};
use crate::smtp::{MailTransport, SendResult};
use tokio::sync::{mpsc, Mutex, OnceCell, RwLock};

/// One client stream's SMTP connection
///
/// Exactly one command runs against the transport at a time: guards check
/// and set the busy flag under the state lock before the transport is
/// touched. The transport mutex is only ever held by the command in flight
/// or by [`Session::close`].
pub struct Session {
    id: RwLock<SessionId>,
    host: String,
    port: u16,
    state: RwLock<ConnectionState>,
    transport: Mutex<Box<dyn MailTransport>>,
    events_tx: Mutex<Option<mpsc::Sender<Event>>>,
    events_rx: Mutex<Option<mpsc::Receiver<Event>>>,
    closed: OnceCell<()>,
}

impl Session {
    /// Create an unconnected session with its outbound event channel
    pub fn new(
        id: SessionId,
        host: impl Into<String>,
        port: u16,
        transport: Box<dyn MailTransport>,
        channel_capacity: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(channel_capacity.max(1));
        Self {
            id: RwLock::new(id),
            host: host.into(),
            port,
            state: RwLock::new(ConnectionState::new()),
            transport: Mutex::new(transport),
            events_tx: Mutex::new(Some(tx)),
            events_rx: Mutex::new(Some(rx)),
            closed: OnceCell::new(),
        }
    }

    /// Current identifier
    pub async fn id(&self) -> SessionId {
        *self.id.read().await
    }

    pub(crate) async fn set_id(&self, id: SessionId) {
        *self.id.write().await = id;
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Snapshot of the current state; no side effects
    pub async fn state(&self) -> SessionSnapshot {
        let id = self.id().await;
        let state = self.state.read().await;
        SessionSnapshot::capture(id, &self.host, self.port, &state)
    }

    pub async fn phase(&self) -> SessionPhase {
        self.state.read().await.phase()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.initialized()
    }

    /// Open the transport connection. Requires `Idle`.
    pub async fn connect(&self) -> GatewayResult<()> {
        self.begin(|state| state.require(SessionPhase::Idle)).await?;

        let result = self.transport.lock().await.connect().await;
        match result {
            Ok(()) => {
                self.complete(true, |state| state.set_connected(true)).await;
                tracing::debug!(host = %self.host, port = self.port, "Transport connected");
                Ok(())
            }
            Err(e) => {
                self.complete(false, |_| {}).await;
                Err(GatewayError::Transport(e))
            }
        }
    }

    /// Authenticate the connection. Requires `Connected`.
    pub async fn login(&self, username: &str, password: &str) -> GatewayResult<()> {
        self.begin(|state| {
            if state.phase() == SessionPhase::Authenticated {
                return Err(GatewayError::AlreadyInState(SessionPhase::Authenticated));
            }
            state.require(SessionPhase::Connected)
        })
        .await?;

        let result = self.transport.lock().await.login(username, password).await;
        match result {
            Ok(()) => {
                self.complete(true, |state| state.set_logged_in(true)).await;
                Ok(())
            }
            Err(e) => {
                self.complete(false, |_| {}).await;
                Err(GatewayError::LoginFailed(e))
            }
        }
    }

    /// Deliver one message. Requires `Authenticated`.
    ///
    /// A failed send leaves the connection state untouched.
    pub async fn send(&self, email: &SimpleEmail) -> GatewayResult<SendResult> {
        self.begin(|state| state.require(SessionPhase::Authenticated)).await?;

        let result = self.transport.lock().await.send_email(email).await;
        match result {
            Ok(sent) => {
                self.complete(true, |_| {}).await;
                Ok(sent)
            }
            Err(e) => {
                self.complete(false, |_| {}).await;
                Err(GatewayError::SendFailed(e))
            }
        }
    }

    /// Drop authentication by cycling the transport. Requires `Authenticated`.
    ///
    /// On success the session is `Connected` again. If the reconnect fails
    /// the session is left `Idle` and the caller reports the closure.
    pub async fn logout(&self) -> GatewayResult<()> {
        self.begin(|state| {
            if state.phase() == SessionPhase::Connected {
                return Err(GatewayError::AlreadyInState(SessionPhase::Connected));
            }
            state.require(SessionPhase::Authenticated)
        })
        .await?;

        let mut transport = self.transport.lock().await;
        if let Err(e) = transport.disconnect().await {
            tracing::warn!(host = %self.host, port = self.port, "Disconnect during logout failed: {}", e);
        }
        self.state.write().await.set_connected(false);

        let result = transport.connect().await;
        drop(transport);

        match result {
            Ok(()) => {
                self.complete(true, |state| state.set_connected(true)).await;
                Ok(())
            }
            Err(e) => {
                self.complete(false, |_| {}).await;
                Err(GatewayError::Transport(e))
            }
        }
    }

    /// Queue an event for the client. Returns false once the channel is gone.
    pub async fn emit(&self, event: Event) -> bool {
        let sender = self.events_tx.lock().await.clone();
        match sender {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Hand out the read end of the event channel, once
    pub async fn take_event_receiver(&self) -> Option<mpsc::Receiver<Event>> {
        self.events_rx.lock().await.take()
    }

    /// Drop the write end so the outbound stream completes after draining
    pub async fn finish_events(&self) {
        self.events_tx.lock().await.take();
    }

    /// Release the transport. Runs once; later callers wait for the first.
    pub async fn close(&self) {
        self.closed
            .get_or_init(|| async {
                self.state.write().await.mark_closed();
                self.finish_events().await;

                // The connected flag lags the transport while a cancelled
                // command was mid-flight, so always disconnect
                let mut transport = self.transport.lock().await;
                if let Err(e) = transport.disconnect().await {
                    tracing::warn!(host = %self.host, port = self.port, "Disconnect on close failed: {}", e);
                }
                self.state.write().await.reset();
                tracing::debug!(host = %self.host, port = self.port, "Transport released");
            })
            .await;
    }

    async fn begin(
        &self,
        guard: impl FnOnce(&ConnectionState) -> GatewayResult<()>,
    ) -> GatewayResult<()> {
        let mut state = self.state.write().await;
        if state.is_closed() {
            return Err(GatewayError::NotFound(self.id().await));
        }
        guard(&state)?;
        state.begin_command();
        Ok(())
    }

    async fn complete(&self, succeeded: bool, apply: impl FnOnce(&mut ConnectionState)) {
        let mut state = self.state.write().await;
        apply(&mut state);
        state.finish_command(succeeded);
    }
}
