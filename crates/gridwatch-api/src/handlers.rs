//! HTTP handlers.
//!
//! Each handler delegates to an engine and maps the engine's error class
//! onto a status code: `InvalidArgument` → 400, everything else → 500.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use gridwatch_health::HealthError;
use gridwatch_metrics::MetricsError;
use gridwatch_state::{HealthCheck, MetricCheck};

use crate::ApiState;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: msg.to_string(),
        }),
    )
        .into_response()
}

/// Empty listings answer 204, anything else is a JSON array.
fn list_response<T: Serialize>(items: Vec<T>) -> Response {
    if items.is_empty() {
        StatusCode::NO_CONTENT.into_response()
    } else {
        Json(items).into_response()
    }
}

fn health_error(e: HealthError) -> Response {
    match e {
        HealthError::InvalidArgument(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
        other => error_response(StatusCode::INTERNAL_SERVER_ERROR, &other.to_string()),
    }
}

fn metrics_error(e: MetricsError) -> Response {
    match e {
        MetricsError::InvalidArgument(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
        other => error_response(StatusCode::INTERNAL_SERVER_ERROR, &other.to_string()),
    }
}

// ── Health checks ──────────────────────────────────────────────────

/// POST /healthcheck
pub async fn register_check(
    State(state): State<ApiState>,
    Json(hc): Json<HealthCheck>,
) -> Response {
    match state.health.register(hc).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => health_error(e),
    }
}

fn list_checks(
    state: &ApiState,
    app: Option<&str>,
    svc: Option<&str>,
    partition: Option<&str>,
) -> Response {
    match state.health.list(app, svc, partition) {
        Ok(checks) => list_response(checks),
        Err(e) => health_error(e),
    }
}

/// GET /healthcheck
pub async fn list_checks_root(State(state): State<ApiState>) -> Response {
    list_checks(&state, None, None, None)
}

/// GET /healthcheck/{app}
pub async fn list_checks_app(State(state): State<ApiState>, Path(app): Path<String>) -> Response {
    list_checks(&state, Some(&app), None, None)
}

/// GET /healthcheck/{app}/{svc}
pub async fn list_checks_svc(
    State(state): State<ApiState>,
    Path((app, svc)): Path<(String, String)>,
) -> Response {
    list_checks(&state, Some(&app), Some(&svc), None)
}

/// GET /healthcheck/{app}/{svc}/{partition}
pub async fn list_checks_partition(
    State(state): State<ApiState>,
    Path((app, svc, partition)): Path<(String, String, String)>,
) -> Response {
    list_checks(&state, Some(&app), Some(&svc), Some(&partition))
}

// ── Metric subscriptions ───────────────────────────────────────────

async fn register_metrics(
    state: &ApiState,
    app: String,
    svc: Option<String>,
    partition: Option<String>,
    names: Vec<String>,
) -> Response {
    let partition = match partition {
        Some(raw) => match raw.parse::<Uuid>() {
            Ok(id) => Some(id),
            Err(_) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    &format!("`{raw}` is not a partition id"),
                )
            }
        },
        None => None,
    };
    let mc = MetricCheck {
        metric_names: names,
        application: app,
        service: svc,
        partition,
    };
    match state.metrics.register(mc).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => metrics_error(e),
    }
}

/// POST /metrics/{app}
pub async fn register_metrics_app(
    State(state): State<ApiState>,
    Path(app): Path<String>,
    Json(names): Json<Vec<String>>,
) -> Response {
    register_metrics(&state, app, None, None, names).await
}

/// POST /metrics/{app}/{svc}
pub async fn register_metrics_svc(
    State(state): State<ApiState>,
    Path((app, svc)): Path<(String, String)>,
    Json(names): Json<Vec<String>>,
) -> Response {
    register_metrics(&state, app, Some(svc), None, names).await
}

/// POST /metrics/{app}/{svc}/{partition}
pub async fn register_metrics_partition(
    State(state): State<ApiState>,
    Path((app, svc, partition)): Path<(String, String, String)>,
    Json(names): Json<Vec<String>>,
) -> Response {
    register_metrics(&state, app, Some(svc), Some(partition), names).await
}

fn list_metrics(
    state: &ApiState,
    app: Option<&str>,
    svc: Option<&str>,
    partition: Option<&str>,
) -> Response {
    match state.metrics.list(app, svc, partition) {
        Ok(subscriptions) => list_response(subscriptions),
        Err(e) => metrics_error(e),
    }
}

/// GET /metrics
pub async fn list_metrics_root(State(state): State<ApiState>) -> Response {
    list_metrics(&state, None, None, None)
}

/// GET /metrics/{app}
pub async fn list_metrics_app(State(state): State<ApiState>, Path(app): Path<String>) -> Response {
    list_metrics(&state, Some(&app), None, None)
}

/// GET /metrics/{app}/{svc}
pub async fn list_metrics_svc(
    State(state): State<ApiState>,
    Path((app, svc)): Path<(String, String)>,
) -> Response {
    list_metrics(&state, Some(&app), Some(&svc), None)
}

/// GET /metrics/{app}/{svc}/{partition}
pub async fn list_metrics_partition(
    State(state): State<ApiState>,
    Path((app, svc, partition)): Path<(String, String, String)>,
) -> Response {
    list_metrics(&state, Some(&app), Some(&svc), Some(&partition))
}

// ── Self health ────────────────────────────────────────────────────

/// GET /watchdog/health — 200 when the engines are up and at least one
/// check is registered, 204 when none are, 500 when the store is
/// unavailable.
pub async fn watchdog_health(State(state): State<ApiState>) -> Response {
    match state.health.list(None, None, None) {
        Ok(checks) if checks.is_empty() => StatusCode::NO_CONTENT.into_response(),
        Ok(_) => StatusCode::OK.into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}
