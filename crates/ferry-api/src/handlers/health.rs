//! Health check handlers for service monitoring.
//!
//! The bridge only serves traffic after metadata sync succeeded, so once the
//! listener is up the service is ready by construction. Probes therefore do
//! not touch the broker.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::server::AppState;

/// Readiness details.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    /// Always `ready` once serving.
    pub status: &'static str,
    /// Time of the check.
    pub timestamp: DateTime<Utc>,
    /// Number of installed partition labels.
    pub partition_labels: usize,
    /// Topic for unlabeled messages.
    pub default_topic: String,
    /// Service version.
    pub version: &'static str,
}

/// Health check endpoint handler, `{"status":"UP"}`.
#[instrument(name = "health_check", skip_all)]
pub async fn health_check() -> Response {
    (StatusCode::OK, Json(serde_json::json!({ "status": "UP" }))).into_response()
}

/// Readiness check endpoint for Kubernetes probes.
#[instrument(name = "readiness_check", skip(state))]
pub async fn readiness_check(State(state): State<AppState>) -> Response {
    let response = ReadinessResponse {
        status: "ready",
        timestamp: Utc::now(),
        partition_labels: state.dispatcher.labels().len(),
        default_topic: state.dispatcher.default_topic().to_string(),
        version: env!("CARGO_PKG_VERSION"),
    };

    debug!(partition_labels = response.partition_labels, "Readiness check completed");

    (StatusCode::OK, Json(response)).into_response()
}

/// Liveness check endpoint for Kubernetes probes.
///
/// Only proves the HTTP server is responding.
#[instrument(name = "liveness_check", skip_all)]
pub async fn liveness_check() -> Response {
    debug!("Performing liveness check");

    let response = serde_json::json!({
        "status": "alive",
        "timestamp": Utc::now(),
        "service": "ferry"
    });

    (StatusCode::OK, Json(response)).into_response()
}
