//! HTTP mapping for relay errors.

use axum::body::{to_bytes, Body};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::orchestrator::RelayError;

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::StorageUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::GenerationFailed(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.to_string() }));
        (self.status_code(), body).into_response()
    }
}

/// Largest plain-text error body carried over into the JSON message.
const MAX_ERROR_TEXT_BYTES: usize = 1024;

/// Give error responses produced outside the handlers (body limit, request
/// timeout, method mismatch) the same `{"error": ...}` body as `RelayError`.
/// The plain `404 Not Found` fallback is left untouched.
pub async fn json_error_body(response: Response) -> Response {
    let status = response.status();
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));

    if !(status.is_client_error() || status.is_server_error())
        || status == StatusCode::NOT_FOUND
        || is_json
    {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let text = to_bytes(body, MAX_ERROR_TEXT_BYTES)
        .await
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).trim().to_string())
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });

    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    let body = Body::from(json!({ "error": text }).to_string());
    Response::from_parts(parts, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn invalid_request_is_400_with_bare_message() {
        let response =
            RelayError::InvalidRequest("sessionId and message are required".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({"error": "sessionId and message are required"})
        );
    }

    #[tokio::test]
    async fn storage_unavailable_is_500() {
        let response = RelayError::StorageUnavailable("disk full".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("disk full"));
    }

    #[test]
    fn generation_failed_is_502() {
        assert_eq!(
            RelayError::GenerationFailed("timeout".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[tokio::test]
    async fn plain_text_error_is_wrapped_in_json() {
        let response = (StatusCode::PAYLOAD_TOO_LARGE, "length limit exceeded").into_response();
        let response = json_error_body(response).await;

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(body_json(response).await, json!({"error": "length limit exceeded"}));
    }

    #[tokio::test]
    async fn empty_error_body_uses_reason_phrase() {
        let response = StatusCode::REQUEST_TIMEOUT.into_response();
        let response = json_error_body(response).await;

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(body_json(response).await, json!({"error": "Request Timeout"}));
    }

    #[tokio::test]
    async fn json_errors_and_not_found_pass_through() {
        let response = RelayError::GenerationFailed("boom".into()).into_response();
        let response = json_error_body(response).await;
        assert_eq!(body_json(response).await, json!({"error": "generation failed: boom"}));

        let response = json_error_body((StatusCode::NOT_FOUND, "Not Found").into_response()).await;
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"Not Found");
    }
}
