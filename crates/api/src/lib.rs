//! Server hosting the order fulfillment saga.
//!
//! Business traffic flows over the message bus; the HTTP surface is
//! operational only: health and Prometheus metrics.

pub mod config;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use event_bus::InMemoryEventBus;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{FulfillmentServices, SagaError};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

/// Shared state behind the HTTP routes.
pub struct AppState {
    pub bus: InMemoryEventBus,
    pub services: FulfillmentServices<InMemoryEventBus>,
    pub metrics: PrometheusHandle,
}

/// Starts the fulfillment services on a fresh in-process bus.
pub async fn create_state(
    config: &Config,
    metrics: PrometheusHandle,
) -> Result<Arc<AppState>, SagaError> {
    let bus = InMemoryEventBus::with_history_capacity(config.bus_history_capacity);
    let services =
        FulfillmentServices::start(bus.clone(), config.saga_config(), config.gateway()).await?;
    Ok(Arc::new(AppState {
        bus,
        services,
        metrics,
    }))
}

/// Creates the Axum application router.
pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health::check))
        .route("/metrics", get(routes::metrics::get))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
