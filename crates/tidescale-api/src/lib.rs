//! tidescale-api — HTTP surface for the autoscaler.
//!
//! Read-only: everything served here comes from the shared `Telemetry`
//! registry the control loops write into.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/workloads` | Status of every monitored workload |
//! | GET | `/api/v1/workloads/{id}` | Status of one workload (`namespace%2Fname`) |
//! | GET | `/api/v1/workloads/{namespace}/{name}` | Same, unencoded |
//! | GET | `/metrics` | Prometheus exposition |
//! | GET | `/healthz` | Liveness |

pub mod handlers;

use axum::Router;
use axum::routing::get;
use tidescale_metrics::Telemetry;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub telemetry: Telemetry,
}

/// Build the complete router (REST + metrics + health).
pub fn build_router(telemetry: Telemetry) -> Router {
    let state = ApiState { telemetry };

    let api_routes = Router::new()
        .route("/workloads", get(handlers::list_workloads))
        .route("/workloads/{id}", get(handlers::get_workload))
        .route("/workloads/{namespace}/{name}", get(handlers::get_workload_by_name))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::prometheus_metrics).with_state(state))
        .route("/healthz", get(handlers::healthz))
}
