//! API error types and JSON error response formatting.
//!
//! Every failure leaves the server as `{ "error": code, "message": text }`
//! with a status derived from the error's kind.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use labpilot_chat::{AdapterError, ChatError};
use labpilot_core::error::{ErrorKind, LabpilotError};

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "bad_request", "not_found").
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type that maps to HTTP status codes and JSON responses.
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request - invalid input or an operation the data cannot support.
    BadRequest(String),
    /// 404 Not Found - dataset, document, or active dataset missing.
    NotFound(String),
    /// 500 Internal Server Error - registry or store failure.
    Internal(String),
    /// 502 Bad Gateway - embedding or language model failed.
    BadGateway(String),
    /// 503 Service Unavailable - feature switched off.
    ServiceUnavailable(String),
}

impl ApiError {
    fn from_kind(kind: ErrorKind, message: String) -> Self {
        match kind {
            ErrorKind::NotFound => ApiError::NotFound(message),
            ErrorKind::Validation => ApiError::BadRequest(message),
            ErrorKind::Collaborator => ApiError::BadGateway(message),
            ErrorKind::Storage | ErrorKind::Config | ErrorKind::Io | ErrorKind::Internal => {
                ApiError::Internal(message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
            ApiError::BadGateway(msg) => {
                tracing::warn!(error = %msg, "Collaborator failed");
                (StatusCode::BAD_GATEWAY, "bad_gateway", msg)
            }
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg)
            }
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<LabpilotError> for ApiError {
    fn from(err: LabpilotError) -> Self {
        ApiError::from_kind(err.kind(), err.to_string())
    }
}

impl From<AdapterError> for ApiError {
    fn from(err: AdapterError) -> Self {
        ApiError::from_kind(err.kind(), err.to_string())
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Disabled => ApiError::ServiceUnavailable(err.to_string()),
            other => ApiError::from_kind(other.kind(), other.to_string()),
        }
    }
}
