//! API error handling
//!
//! Service errors are rendered as Open Service Broker error bodies:
//! `{"error": <code>, "description": <message>}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use helm_broker_service::ServiceError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error code returned when `accepts_incomplete=true` is missing
pub const ASYNC_REQUIRED: &str = "AsyncRequired";

/// Error code returned when another operation blocks the request
pub const CONCURRENCY_ERROR: &str = "ConcurrencyError";

/// API error type that can be converted to HTTP responses
#[derive(Debug)]
pub struct ApiError {
    status_code: StatusCode,
    error_code: String,
    description: String,
}

impl ApiError {
    /// Create an API error with an OSB error code
    pub fn with_code(
        status_code: StatusCode,
        error_code: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            status_code,
            error_code: error_code.into(),
            description: description.into(),
        }
    }

    /// Create a bad request error (400)
    pub fn bad_request(description: impl Into<String>) -> Self {
        Self::with_code(StatusCode::BAD_REQUEST, "BadRequest", description)
    }

    /// Create a not found error (404)
    pub fn not_found(description: impl Into<String>) -> Self {
        Self::with_code(StatusCode::NOT_FOUND, "NotFound", description)
    }

    /// Create a precondition failed error (412)
    pub fn precondition_failed(description: impl Into<String>) -> Self {
        Self::with_code(
            StatusCode::PRECONDITION_FAILED,
            "PreconditionFailed",
            description,
        )
    }

    /// The broker only supports asynchronous instance operations (422)
    pub fn async_required() -> Self {
        Self::with_code(
            StatusCode::UNPROCESSABLE_ENTITY,
            ASYNC_REQUIRED,
            "This service plan requires client support for asynchronous service operations.",
        )
    }

    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }

    pub fn error_code(&self) -> &str {
        &self.error_code
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_code, self.description)
    }
}

impl std::error::Error for ApiError {}

/// Error response JSON structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// OSB error code
    pub error: String,

    /// Human readable description
    pub description: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status_code.is_server_error() {
            tracing::error!(code = %self.error_code, "{}", self.description);
        }

        let body = ErrorResponse {
            error: self.error_code,
            description: self.description,
        };

        (self.status_code, Json(body)).into_response()
    }
}

/// Convert ServiceError to ApiError
impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(msg) => ApiError::not_found(format!("Not found: {}", msg)),
            ServiceError::Conflict(msg) => {
                ApiError::with_code(StatusCode::CONFLICT, "Conflict", msg)
            }
            ServiceError::OperationInProgress(msg) => {
                ApiError::with_code(StatusCode::UNPROCESSABLE_ENTITY, CONCURRENCY_ERROR, msg)
            }
            ServiceError::Unavailable(msg) => ApiError::with_code(
                StatusCode::SERVICE_UNAVAILABLE,
                "ServiceUnavailable",
                format!("Storage unavailable: {}", msg),
            ),
            ServiceError::NotBindable(msg) => {
                ApiError::with_code(StatusCode::BAD_REQUEST, "NotBindable", msg)
            }
            ServiceError::InvalidInput(msg) => ApiError::bad_request(msg),
            ServiceError::BindFailed(msg) => ApiError::with_code(
                StatusCode::INTERNAL_SERVER_ERROR,
                "BindFailed",
                format!("Cannot produce credentials: {}", msg),
            ),
            ServiceError::Internal(msg) => ApiError::with_code(
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalError",
                format!("Internal error: {}", msg),
            ),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::bad_request(format!("Invalid JSON: {}", err))
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
