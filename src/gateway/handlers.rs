//! Route handlers.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use crate::orchestrator::RelayError;

const INDEX_HTML: &str = include_str!("static/index.html");

/// Body of `POST /chat`. Absent and `null` fields both parse as `None`.
#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Parse a `/chat` body. The content type is not checked.
pub fn parse_chat_request(body: &[u8]) -> Result<ChatRequest, RelayError> {
    serde_json::from_slice(body)
        .map_err(|e| RelayError::InvalidRequest(format!("invalid JSON body: {e}")))
}

/// GET / — embedded chat page
pub async fn handle_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// POST /chat — append the message and generate a reply
pub async fn handle_chat(State(state): State<AppState>, body: Bytes) -> Response {
    let request = match parse_chat_request(&body) {
        Ok(request) => request,
        Err(e) => {
            state.orchestrator.metrics().record_chat(e.outcome());
            return e.into_response();
        }
    };

    let session_id = request.session_id.as_deref().unwrap_or_default();
    let message = request.message.as_deref().unwrap_or_default();

    match state.orchestrator.handle_chat(session_id, message).await {
        Ok(reply) => Json(reply).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /sessions/{sessionId}/history — read-only view of a session
pub async fn handle_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let store = state.orchestrator.sessions().resolve(&session_id);
    match store.history().await {
        Ok(history) => Json(json!({
            "sessionId": session_id,
            "history": history,
        }))
        .into_response(),
        Err(e) => {
            let e = RelayError::from(e);
            tracing::warn!(session_id = %session_id, error = %e, "History read failed");
            e.into_response()
        }
    }
}

/// GET /health
pub async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "provider": state.orchestrator.provider_name(),
        "sessions_backend": state.orchestrator.sessions().storage_name(),
    }))
}

/// GET /metrics — Prometheus text exposition
pub async fn handle_metrics(State(state): State<AppState>) -> Response {
    match state.orchestrator.metrics().render() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            text,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": format!("Failed to encode metrics: {e}")})),
        )
            .into_response(),
    }
}

pub async fn handle_not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}
