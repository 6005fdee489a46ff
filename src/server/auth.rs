use crate::protocol::ErrorCode;
use crate::server::routes::ErrorBody;
use crate::server::AppState;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Header carrying the shared secret
pub const AUTH_HEADER: &str = "X-Auth-Key";

/// Reject requests without the configured `X-Auth-Key`
pub async fn require_auth_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.auth_key.as_deref() else {
        return next.run(request).await;
    };

    let rejection = match request.headers().get(AUTH_HEADER).and_then(|v| v.to_str().ok()) {
        Some(key) if key == expected => None,
        Some(_) => Some("Invalid authentication key"),
        None => Some("Authentication key required"),
    };
    let Some(message) = rejection else {
        return next.run(request).await;
    };

    tracing::warn!(path = %request.uri().path(), "Rejected request: {}", message);
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorBody {
            code: ErrorCode::Unauthorized,
            message: message.to_string(),
        }),
    )
        .into_response()
}
