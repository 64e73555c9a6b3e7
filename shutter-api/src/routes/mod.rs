//! HTTP Routes Module
//!
//! - `/` and `/r/` - usage note
//! - `/r/{size}/{*path}` - derived images
//! - `/health/*` - Kubernetes-compatible health checks
//! - `/metrics` - Prometheus exposition

pub mod health;
pub mod resize;

use axum::{middleware::from_fn_with_state, routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

pub use health::create_router as health_router;

/// Build the full application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(resize::usage))
        .route("/r/", get(resize::usage))
        .route("/r/:size/*path", get(resize::resize))
        .route("/metrics", get(metrics_handler))
        .nest("/health", health_router())
        .layer(from_fn_with_state(state.clone(), observability_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
