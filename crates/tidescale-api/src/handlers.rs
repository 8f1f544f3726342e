//! REST API handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::debug;

use tidescale_core::Workload;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

// ── Workloads ──────────────────────────────────────────────────

/// GET /api/v1/workloads
pub async fn list_workloads(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.telemetry.statuses().await)
}

/// GET /api/v1/workloads/{id}
pub async fn get_workload(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.telemetry.get(&id).await {
        Some(status) => ApiResponse::ok(status).into_response(),
        None => {
            debug!(workload = %id, "status requested for unknown workload");
            error_response("workload not found", StatusCode::NOT_FOUND).into_response()
        }
    }
}

/// GET /api/v1/workloads/{namespace}/{name}
pub async fn get_workload_by_name(
    state: State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    get_workload(state, Path(Workload::new(namespace, name).id())).await
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let statuses = state.telemetry.statuses().await;
    let body = tidescale_metrics::render_prometheus(&statuses);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// GET /healthz
pub async fn healthz() -> &'static str {
    "ok"
}
