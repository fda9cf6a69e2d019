//! API error envelope: `{ error, details? }` with a matching status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use clipforge_core::ClipForgeError;
use serde::Serialize;

/// An error ready to leave the API boundary.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub details: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
}

impl ApiError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error: what.into(),
            details: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: message.into(),
            details: None,
        }
    }
}

impl From<ClipForgeError> for ApiError {
    fn from(error: ClipForgeError) -> Self {
        let status = match &error {
            ClipForgeError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ClipForgeError::NotFound(_) => StatusCode::NOT_FOUND,
            ClipForgeError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            ClipForgeError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let (error_text, details) = match &error {
            ClipForgeError::InvalidInput(msg) => (msg.clone(), None),
            other => (short_name(other).to_string(), Some(other.to_string())),
        };
        Self {
            status,
            error: error_text,
            details,
        }
    }
}

fn short_name(error: &ClipForgeError) -> &'static str {
    match error {
        ClipForgeError::Io(_) => "io error",
        ClipForgeError::InvalidInput(_) => "invalid input",
        ClipForgeError::UpstreamUnavailable(_) => "upstream tool unavailable",
        ClipForgeError::ProbeEmpty(_) => "probe empty",
        ClipForgeError::PartialFetchUnsupported => "partial fetch unsupported",
        ClipForgeError::ClipFailure(_) => "clip failed",
        ClipForgeError::EnhancementFailure(_) => "enhancement failed",
        ClipForgeError::Timeout { .. } => "timed out",
        ClipForgeError::Cancelled => "cancelled",
        ClipForgeError::NotFound(_) => "not found",
        ClipForgeError::Serialization(_) => "serialization error",
        ClipForgeError::Internal(_) => "internal error",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: &self.error,
            details: self.details.as_deref(),
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err: ApiError = ClipForgeError::InvalidInput("bad url".into()).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.error, "bad url");

        let err: ApiError = ClipForgeError::UpstreamUnavailable("yt-dlp missing".into()).into();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);

        let err: ApiError = ClipForgeError::Timeout {
            what: "transcode".into(),
            seconds: 600,
        }
        .into();
        assert_eq!(err.status, StatusCode::GATEWAY_TIMEOUT);

        let err: ApiError = ClipForgeError::Internal("boom".into()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.details.is_some());
    }
}
