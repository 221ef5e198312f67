//! Prometheus exposition of request and delivery counters.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::server::AppState;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Installs the process-wide Prometheus recorder.
///
/// # Errors
///
/// Fails if a global recorder is already installed.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    metrics::describe_counter!("ferry_requests_total", "Receive requests by dispatch outcome");
    metrics::describe_counter!("ferry_deliveries_total", "Delivery events by outcome");

    Ok(handle)
}

/// Renders all metrics in Prometheus text format.
pub async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => ([(header::CONTENT_TYPE, CONTENT_TYPE)], handle.render()).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}
