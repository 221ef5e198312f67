//! Ferry HTTP API.
//!
//! Exposes the receive endpoint that routes payloads onto Kafka, health
//! probes, Prometheus metrics and the layered service configuration.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod dispatch;
pub mod handlers;
pub mod middleware;
pub mod server;

pub use config::Config;
pub use dispatch::Dispatcher;
pub use handlers::metrics::install_recorder;
pub use middleware::auth::BasicAuth;
pub use server::{cancel_on_signal, create_router, serve, start_server, AppState, ServerOptions};
