//! Health Check API Handlers
//!
//! Liveness and readiness probes.

use axum::{extract::State, http::StatusCode, response::IntoResponse};

use super::AppState;

/// GET /health
/// Liveness probe, answers as long as the process serves HTTP
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /ready
/// Readiness probe, 503 until the controllers reached the cluster
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if state.is_ready() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}
