use crate::sessions::SessionError;

/// Message returned when `sessionId` or `message` is missing or empty.
pub const MISSING_FIELDS_MESSAGE: &str = "sessionId and message are required";

/// Failure of one chat request. Each variant maps to exactly one HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// Missing or empty fields; the client should fix the request.
    #[error("{0}")]
    InvalidRequest(String),
    /// Durable history could not be read or written.
    #[error("session storage unavailable: {0}")]
    StorageUnavailable(String),
    /// The generation provider failed, timed out, or returned malformed output.
    #[error("generation failed: {0}")]
    GenerationFailed(String),
}

impl RelayError {
    /// Metric label / log tag for this error kind.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::GenerationFailed(_) => "generation_failed",
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidRequest(_))
    }
}

impl From<SessionError> for RelayError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::InvalidInput(msg) => RelayError::InvalidRequest(msg),
            SessionError::StorageUnavailable(msg) => RelayError::StorageUnavailable(msg),
        }
    }
}
