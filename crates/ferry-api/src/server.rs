//! HTTP server configuration and request routing.
//!
//! Requests flow through middleware in order:
//! 1. Request ID propagation
//! 2. Request/response tracing
//! 3. Timeout enforcement
//! 4. Body size limit
//! 5. Basic authentication (receive endpoint only, when configured)
//! 6. Handler execution
//!
//! # Graceful Shutdown
//!
//! The server stops accepting connections once its cancellation token
//! fires and finishes in-flight requests. Closing the producer is left to
//! the caller, after the server has returned.

use std::{fmt, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{DefaultBodyLimit, Request},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    dispatch::Dispatcher,
    handlers,
    middleware::auth::{basic_auth_middleware, BasicAuth},
};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Request dispatcher.
    pub dispatcher: Dispatcher,
    /// Prometheus handle, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Creates state without a metrics recorder.
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher, metrics: None }
    }

    /// Attaches a Prometheus handle for `/metrics`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("dispatcher", &self.dispatcher)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

/// Router level options.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Largest accepted body.
    pub max_payload_bytes: usize,
    /// Credentials required on the receive endpoint.
    pub basic_auth: Option<BasicAuth>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self { request_timeout: Duration::from_secs(30), max_payload_bytes: 10 * 1024 * 1024, basic_auth: None }
    }
}

/// Creates the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use ferry_api::{create_router, AppState, Dispatcher, ServerOptions};
/// use ferry_core::{JsonSerializer, PartitionLabelTable, Producer};
///
/// fn build(producer: Arc<dyn Producer>) -> axum::Router {
///     let dispatcher =
///         Dispatcher::new(PartitionLabelTable::empty(), producer, Arc::new(JsonSerializer), "metrics");
///     create_router(AppState::new(dispatcher), &ServerOptions::default())
/// }
/// ```
pub fn create_router(state: AppState, options: &ServerOptions) -> Router {
    let health_routes = Router::new()
        .route("/healthz", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/live", get(handlers::liveness_check))
        .route("/metrics", get(handlers::render_metrics));

    let mut api_routes = Router::new().route("/receive", post(handlers::receive_message));
    if let Some(auth) = &options.basic_auth {
        api_routes =
            api_routes.layer(middleware::from_fn_with_state(Arc::new(auth.clone()), basic_auth_middleware));
    }

    Router::new()
        .merge(health_routes)
        .merge(api_routes)
        .layer(DefaultBodyLimit::max(options.max_payload_bytes))
        .layer(request_timeout(options.request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(inject_request_id))
        .with_state(state)
}

/// Middleware that propagates or assigns a request ID.
///
/// Reuses an incoming `X-Request-Id` and otherwise generates one, then
/// echoes it on the response.
async fn inject_request_id(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(request_id.clone());

    let mut response = next.run(req).await;

    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header_value);
    }

    response
}

/// Binds `addr` and serves `router` until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns `std::io::Error` if the address cannot be bound or the server
/// fails.
pub async fn start_server(
    router: Router,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    serve(listener, router, shutdown).await
}

/// Serves `router` on an already bound listener until `shutdown` is
/// cancelled.
///
/// # Errors
///
/// Returns `std::io::Error` if the server fails.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> Result<(), std::io::Error> {
    let actual_addr = listener.local_addr()?;
    info!(addr = %actual_addr, "HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("HTTP server stopped gracefully");
    Ok(())
}

/// Cancels `token` on CTRL+C or SIGTERM.
pub async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received CTRL+C, starting graceful shutdown");
        },
        () = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        },
        () = token.cancelled() => return,
    }

    token.cancel();
}

/// Answers `408 Request Timeout` for requests running past `timeout`.
fn request_timeout(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}
