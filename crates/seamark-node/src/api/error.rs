//! API error types and response handling.
//!
//! This module provides a unified error type for all API handlers
//! with automatic conversion to appropriate HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type.
///
/// Each variant maps to a specific HTTP status code and produces a
/// consistent JSON error response.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// 400 Bad Request - Invalid input from client.
    BadRequest {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 403 Forbidden - Shared secret mismatch. Nothing was mutated.
    Forbidden {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 500 Internal Server Error - Unexpected server-side error.
    InternalError {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional details (not exposed to client in production).
        details: Option<String>,
    },
}

/// Standard JSON error response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "bad_token",
    "message": "Shared secret mismatch",
    "details": null
}))]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "bad_token").
    #[schema(example = "bad_token")]
    pub error: String,

    /// Human-readable error message.
    #[schema(example = "Shared secret mismatch")]
    pub message: String,

    /// Optional additional details for debugging.
    #[schema(nullable)]
    pub details: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match self {
            Self::BadRequest {
                error_code,
                message,
            } => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: error_code,
                    message,
                    details: None,
                },
            ),

            Self::Forbidden {
                error_code,
                message,
            } => (
                StatusCode::FORBIDDEN,
                ErrorResponse {
                    error: error_code,
                    message,
                    details: None,
                },
            ),

            Self::InternalError {
                error_code,
                message,
                details,
            } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    error: error_code,
                    message,
                    details,
                },
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

/// Convert from seamark_core errors.
///
/// Malformed-input errors are the caller's fault and map to 400;
/// everything else (persistence, I/O) is a node-side 500.
impl From<seamark_core::Error> for ApiError {
    fn from(err: seamark_core::Error) -> Self {
        if err.is_config_error() {
            Self::BadRequest {
                error_code: err.error_code().to_string(),
                message: err.to_string(),
            }
        } else {
            Self::InternalError {
                error_code: err.error_code().to_string(),
                message: err.to_string(),
                details: None,
            }
        }
    }
}
