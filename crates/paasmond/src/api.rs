//! HTTP surface: Prometheus exposition and a liveness probe.
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/metrics` | Prometheus exposition |
//! | GET | `/healthz` | Liveness |

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::error;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub registry: Registry,
}

pub fn build_router(registry: Registry) -> Router {
    Router::new()
        .route("/metrics", get(prometheus_metrics))
        .route("/healthz", get(healthz))
        .with_state(ApiState { registry })
}

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> Response {
    let encoder = TextEncoder::new();
    let families = state.registry.gather();

    let mut body = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut body) {
        error!(error = %e, "failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", prometheus::TEXT_FORMAT)],
        body,
    )
        .into_response()
}

/// GET /healthz
pub async fn healthz() -> &'static str {
    "ok"
}
