//! gridwatch-api — the watchdog's HTTP listener surface.
//!
//! Thin CRUD over the engines:
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/healthcheck` | Register a health check |
//! | GET | `/healthcheck[/{app}[/{svc}[/{partition}]]]` | List health checks |
//! | POST | `/metrics/{app}[/{svc}[/{partition}]]` | Register a metric subscription |
//! | GET | `/metrics[/{app}[/{svc}[/{partition}]]]` | List metric subscriptions |
//! | GET | `/watchdog/health` | Watchdog self-health |
//!
//! Listing endpoints answer 204 when the filtered result is empty.

pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use gridwatch_health::HealthCheckEngine;
use gridwatch_metrics::MetricsEngine;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub health: Arc<HealthCheckEngine>,
    pub metrics: Arc<MetricsEngine>,
}

/// Build the complete watchdog router.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route(
            "/healthcheck",
            get(handlers::list_checks_root).post(handlers::register_check),
        )
        .route("/healthcheck/{app}", get(handlers::list_checks_app))
        .route("/healthcheck/{app}/{svc}", get(handlers::list_checks_svc))
        .route(
            "/healthcheck/{app}/{svc}/{partition}",
            get(handlers::list_checks_partition),
        )
        .route("/metrics", get(handlers::list_metrics_root))
        .route(
            "/metrics/{app}",
            get(handlers::list_metrics_app).post(handlers::register_metrics_app),
        )
        .route(
            "/metrics/{app}/{svc}",
            get(handlers::list_metrics_svc).post(handlers::register_metrics_svc),
        )
        .route(
            "/metrics/{app}/{svc}/{partition}",
            get(handlers::list_metrics_partition).post(handlers::register_metrics_partition),
        )
        .route("/watchdog/health", get(handlers::watchdog_health))
        .with_state(state)
}
