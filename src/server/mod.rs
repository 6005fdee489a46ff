//! HTTP surface of the gateway

pub mod auth;
pub mod routes;

use crate::config::GatewayConfig;
use crate::error::GatewayResult;
use crate::session::{SessionRegistry, StreamOptions};
use crate::smtp::TransportFactory;
use axum::routing::{get, post};
use axum::{middleware, Router};
use std::sync::Arc;
use tokio::net::TcpListener;

pub use auth::{require_auth_key, AUTH_HEADER};
pub use routes::{ErrorBody, Health, StreamParams, JSON_LINES};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub registry: SessionRegistry,
    pub options: StreamOptions,
    pub max_line_bytes: usize,
    pub auth_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(config: &GatewayConfig, factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            registry: SessionRegistry::new(factory, config.stream.channel_capacity),
            options: StreamOptions {
                heartbeat: config.heartbeat_interval(),
            },
            max_line_bytes: config.stream.max_line_bytes,
            auth_key: config.server.auth_key.as_deref().map(Arc::from),
        }
    }
}

/// Build the router. `/health` is exempt from the auth key check.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/smtp/stream", post(routes::smtp_stream))
        .route("/imap/stream", post(routes::imap_stream))
        .route("/smtp/sessions/:id", get(routes::session_status))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth_key));

    Router::new()
        .route("/health", get(routes::health))
        .merge(protected)
        .with_state(state)
}

/// Serve until Ctrl-C
pub async fn serve(config: GatewayConfig, factory: Arc<dyn TransportFactory>) -> GatewayResult<()> {
    let addr = config.bind_addr()?;
    let state = AppState::new(&config, factory);
    if state.auth_key.is_none() {
        tracing::warn!("No auth key configured, accepting unauthenticated requests");
    }

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
