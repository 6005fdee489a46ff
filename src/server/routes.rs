use crate::error::GatewayError;
use crate::protocol::{decode_commands, ErrorCode};
use crate::server::AppState;
use crate::session::{open_stream, SessionId, SessionSnapshot};
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// Content type of both stream directions
pub const JSON_LINES: &str = "application/jsonl";

/// JSON body of every non-streaming error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::InvalidRequest(_) | GatewayError::Decode(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::PreconditionFailed { .. } | GatewayError::AlreadyInState(_) => StatusCode::CONFLICT,
            GatewayError::Transport(_) | GatewayError::LoginFailed(_) | GatewayError::SendFailed(_) => {
                StatusCode::BAD_GATEWAY
            }
            GatewayError::Config(_) | GatewayError::Io(_) | GatewayError::Task(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Stream target, `?host=...&port=...`
#[derive(Debug, Deserialize)]
pub struct StreamParams {
    #[serde(alias = "smtpHost")]
    pub host: Option<String>,
    #[serde(alias = "smtpHostPort")]
    pub port: Option<u16>,
}

impl StreamParams {
    fn target(&self) -> Result<(&str, u16), GatewayError> {
        let host = self
            .host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| GatewayError::invalid_request("SMTP host is required"))?;

        match self.port {
            Some(port) if port != 0 => Ok((host, port)),
            _ => Err(GatewayError::invalid_request("SMTP port must be between 1 and 65535")),
        }
    }
}

/// `POST /smtp/stream`: run one SMTP session for the lifetime of the request
pub async fn smtp_stream(
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
    body: Body,
) -> Result<Response, GatewayError> {
    let (host, port) = params.target()?;
    tracing::info!(host, port, "Opening SMTP stream");

    let commands = decode_commands(body.into_data_stream(), state.max_line_bytes);
    let opened = open_stream(&state.registry, host, port, commands, &state.options).await?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, JSON_LINES)],
        Body::from_stream(opened.events),
    )
        .into_response())
}

/// `POST /imap/stream`: reserved
pub async fn imap_stream() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            code: ErrorCode::Internal,
            message: "IMAP streaming is not available".to_string(),
        }),
    )
        .into_response()
}

/// `GET /smtp/sessions/{id}`
pub async fn session_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, GatewayError> {
    let id: SessionId = id
        .parse()
        .map_err(|_| GatewayError::invalid_request(format!("Invalid session id '{}'", id)))?;

    let session = state.registry.find(&id).await.ok_or(GatewayError::NotFound(id))?;
    Ok(Json(session.state().await))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub sessions: usize,
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok".to_string(),
        sessions: state.registry.len().await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(host: Option<&str>, port: Option<u16>) -> StreamParams {
        StreamParams {
            host: host.map(String::from),
            port,
        }
    }

    #[test]
    fn test_stream_target() {
        assert_eq!(params(Some("smtp.gmail.com"), Some(587)).target().unwrap(), ("smtp.gmail.com", 587));
        assert!(params(Some("  "), Some(587)).target().is_err());
        assert!(params(None, Some(587)).target().is_err());
        assert!(params(Some("smtp.gmail.com"), Some(0)).target().is_err());
        assert!(params(Some("smtp.gmail.com"), None).target().is_err());
    }

    #[test]
    fn test_param_aliases() {
        let params: StreamParams =
            serde_json::from_str(r#"{"smtpHost":"smtp.gmail.com","smtpHostPort":465}"#).unwrap();
        assert_eq!(params.target().unwrap(), ("smtp.gmail.com", 465));
    }

    #[test]
    fn test_error_status() {
        let response = GatewayError::invalid_request("bad").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = GatewayError::NotFound(SessionId::new()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response =
            GatewayError::Transport(crate::smtp::SmtpError::ConnectionFailed("refused".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
