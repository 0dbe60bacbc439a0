//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Live bus subscriptions held by the saga handlers.
    pub subscriptions: usize,
    /// Outbox records not yet published.
    pub pending_outbox: usize,
}

/// GET /health: reports whether the saga handlers are listening.
///
/// Answers 503 once the bus is closed or a handler subscription has died.
pub async fn check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let subscriptions = state
        .services
        .subscriptions()
        .iter()
        .filter(|s| s.is_active())
        .count();
    let pending_outbox = state
        .services
        .orders()
        .repository()
        .pending_outbox_count()
        .await;

    let healthy = !state.bus.is_closed() && subscriptions == state.services.subscriptions().len();
    let (code, status) = if healthy {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        code,
        Json(HealthResponse {
            status,
            subscriptions,
            pending_outbox,
        }),
    )
}
