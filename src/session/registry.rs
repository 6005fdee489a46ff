use crate::error::{GatewayError, GatewayResult};
use crate::session::session::Session;
use crate::session::state::SessionId;
use crate::smtp::TransportFactory;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Live sessions keyed by their current identifier
///
/// Mutations (`create`, `reassign`, `remove`, `release`) take the write
/// lock, so a lookup sees a session under exactly one identifier at any
/// instant.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<SessionId, Arc<Session>>>>,
    factory: Arc<dyn TransportFactory>,
    channel_capacity: usize,
}

impl SessionRegistry {
    pub fn new(factory: Arc<dyn TransportFactory>, channel_capacity: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            factory,
            channel_capacity,
        }
    }

    /// Connect a new session and register it.
    ///
    /// The transport is connected before the entry is added; on failure
    /// nothing is registered.
    pub async fn create(&self, host: &str, port: u16) -> GatewayResult<(SessionId, Arc<Session>)> {
        let id = SessionId::new();
        let transport = self.factory.create(host, port);
        let session = Arc::new(Session::new(id, host, port, transport, self.channel_capacity));

        if let Err(e) = session.connect().await {
            tracing::error!(host, port, "Failed to open SMTP session: {}", e);
            return Err(e);
        }

        self.sessions.write().await.insert(id, session.clone());
        tracing::info!(session = %id, host, port, "SMTP session created");
        Ok((id, session))
    }

    pub async fn find(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Move a session to a fresh identifier and return it
    pub async fn reassign(&self, old_id: &SessionId) -> GatewayResult<SessionId> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.remove(old_id).ok_or(GatewayError::NotFound(*old_id))?;

        let new_id = loop {
            let candidate = SessionId::new();
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };
        session.set_id(new_id).await;
        sessions.insert(new_id, session);
        drop(sessions);

        tracing::info!(session = %new_id, previous = %old_id, "Session reassigned");
        Ok(new_id)
    }

    /// Remove the session registered under `id` and release its transport.
    ///
    /// Returns false if nothing was registered under `id`.
    pub async fn remove(&self, id: &SessionId) -> bool {
        let removed = self.sessions.write().await.remove(id);
        match removed {
            Some(session) => {
                session.close().await;
                tracing::info!(session = %id, "Session removed");
                true
            }
            None => false,
        }
    }

    /// Remove `session` under whatever identifier it holds now and release
    /// its transport. The transport is closed when this returns, whether or
    /// not this call was the one that removed the entry.
    pub async fn release(&self, session: &Arc<Session>) -> bool {
        let removed = {
            let mut sessions = self.sessions.write().await;
            let id = session.id().await;
            match sessions.get(&id) {
                Some(entry) if Arc::ptr_eq(entry, session) => sessions.remove(&id).map(|_| id),
                _ => None,
            }
        };

        session.close().await;
        if let Some(id) = removed {
            tracing::info!(session = %id, host = session.host(), "Session released");
        }
        removed.is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Identifiers currently registered
    pub async fn ids(&self) -> Vec<SessionId> {
        self.sessions.read().await.keys().copied().collect()
    }
}
