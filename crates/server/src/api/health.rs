use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use super::AppState;
use super::schemas::{HealthResponse, MetricsResponse};

/// `GET /health` -- returns service status together with a metrics snapshot.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    summary = "Health check",
    description = "Returns service status and a snapshot of vault metrics.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let body = HealthResponse {
        status: "ok".into(),
        metrics: state.vault.metrics().into(),
    };
    (StatusCode::OK, Json(body))
}

/// `GET /metrics` -- returns the vault metrics snapshot.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Health",
    summary = "Vault metrics",
    description = "Returns counters for uploads, downloads and download token activity.",
    responses(
        (status = 200, description = "Current metrics", body = MetricsResponse)
    )
)]
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body: MetricsResponse = state.vault.metrics().into();
    (StatusCode::OK, Json(body))
}
