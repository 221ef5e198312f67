//! HTTP request handlers for the Ferry API.
//!
//! Handlers are grouped by functionality:
//! - `receive` - Message intake and dispatch
//! - `health` - Health, liveness and readiness probes
//! - `metrics` - Prometheus exposition
//!
//! # Error Handling
//!
//! Failed requests get a JSON body `{"error": {"code", "message"}}` with a
//! code from the bridge's error taxonomy (E1001-E4003).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ferry_core::{ErrorKind, FerryError};
use serde::Serialize;

pub mod health;
pub mod metrics;
pub mod receive;

pub use health::{health_check, liveness_check, readiness_check};
pub use metrics::render_metrics;
pub use receive::receive_message;

/// Error response with code and message.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error details including code and message
    pub error: ErrorDetail,
}

/// Detailed error information.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Error code from the taxonomy (E1001-E4003)
    pub code: String,
    /// Human-readable error description
    pub message: String,
}

/// HTTP status for an error raised while handling a request.
pub const fn status_for(error: &FerryError) -> StatusCode {
    match error.kind() {
        ErrorKind::Routing | ErrorKind::Serialization => StatusCode::BAD_REQUEST,
        ErrorKind::Enqueue | ErrorKind::Config | ErrorKind::Metadata | ErrorKind::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        },
    }
}

/// Builds the JSON error response for `error`.
pub fn error_response(error: &FerryError) -> Response {
    let body = ErrorResponse {
        error: ErrorDetail { code: error.code().to_string(), message: error.to_string() },
    };

    (status_for(error), Json(body)).into_response()
}
