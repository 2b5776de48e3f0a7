//! Error type for HTTP handlers.
//!
//! Handlers return `Result<_, ApiError>`; this type implements axum's
//! `IntoResponse` so every failure renders the same JSON body:
//!
//! ```json
//! { "success": false, "message": "Order not found", "error": "NOT_FOUND" }
//! ```
//!
//! Domain errors are converted at the handler boundary with the constructor
//! matching their kind (validation → 400, not-found → 404, conflict → 409,
//! overload → 503, everything else → 500).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
#[derive(Debug)]
pub struct ApiError {
    /// HTTP status code.
    status: StatusCode,
    /// User-facing message.
    message: String,
    /// Short machine-readable error kind.
    code: &'static str,
}

impl ApiError {
    /// Create an error with an explicit status and code.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>, code: &'static str) -> Self {
        Self {
            status,
            message: message.into(),
            code,
        }
    }

    /// 400 Bad Request: malformed input or an invalid state transition.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, "BAD_REQUEST")
    }

    /// 404 Not Found.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("{resource} not found"),
            "NOT_FOUND",
        )
    }

    /// 409 Conflict: e.g. order already has an active assignment.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message, "CONFLICT")
    }

    /// 429 Too Many Requests: per-client rate limit refused the request.
    #[must_use]
    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, message, "RATE_LIMITED")
    }

    /// 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message,
            "INTERNAL_ERROR",
        )
    }

    /// 503 Service Unavailable: admission control refused the request.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message, "UNAVAILABLE")
    }

    /// The HTTP status this error renders with.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
    error: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(
                status = %self.status,
                code = self.code,
                message = %self.message,
                "Request failed"
            );
        }

        let body = ErrorBody {
            success: false,
            message: self.message,
            error: self.code,
        };

        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_and_message() {
        let err = ApiError::bad_request("quantity must be positive");
        assert_eq!(err.to_string(), "[BAD_REQUEST] quantity must be positive");
    }

    #[test]
    fn not_found_formats_resource() {
        let err = ApiError::not_found("Order 42");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "[NOT_FOUND] Order 42 not found");
    }

    #[test]
    fn unavailable_maps_to_503() {
        let err = ApiError::unavailable("assignment service overloaded");
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
