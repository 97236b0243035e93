//! Participant process with an admin HTTP surface.
//!
//! Hosts one participant on its RPC endpoint and exposes health, Prometheus
//! metrics, a status snapshot and fault-injection controls over HTTP.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use participant::{CoordinatorClient, ParticipantServer};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::NodeConfig;

/// Shared state accessible from all handlers.
pub struct AppState<C> {
    pub server: ParticipantServer<C>,
}

impl<C: CoordinatorClient> AppState<C> {
    pub fn new(server: ParticipantServer<C>) -> Self {
        Self { server }
    }
}

/// Creates the admin router with all routes and shared state.
pub fn create_app<C: CoordinatorClient>(
    state: Arc<AppState<C>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/status", get(routes::status::get::<C>))
        .route("/control/unreliable", post(routes::control::set_unreliable::<C>))
        .route("/control/kill", post(routes::control::kill::<C>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
