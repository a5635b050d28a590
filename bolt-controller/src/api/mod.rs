//! API Module
//!
//! HTTP probes for the controller process. The controller has no other
//! HTTP surface: declarations are submitted to the cluster directly.

pub mod health;

use axum::{Router, routing::get};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tower_http::trace::TraceLayer;

/// State shared with the probe handlers
#[derive(Clone, Default)]
pub struct AppState {
    ready: Arc<AtomicBool>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the controllers as connected and running
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Create the probe router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Liveness
        .route("/health", get(health::health_check))
        // Readiness
        .route("/ready", get(health::readiness))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
