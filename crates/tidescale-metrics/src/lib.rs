//! tidescale-metrics — where utilization comes from and where loop
//! telemetry goes.
//!
//! # Architecture
//!
//! ```text
//! MetricsSource (trait)
//!   ├── PrometheusSource → GET /api/v1/query, 0.0 sentinel on failure
//!   └── StaticSource     → in-memory values (tests, dry runs)
//!
//! Telemetry
//!   ├── register() → Arc<WorkloadTelemetry> handed to each control loop
//!   └── statuses() → WorkloadStatus list for the API
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod error;
pub mod prometheus;
pub mod query;
pub mod source;
pub mod telemetry;

pub use error::{MetricError, MetricResult};
pub use prometheus::render_prometheus;
pub use query::PrometheusSource;
pub use source::{MetricsSource, StaticSource};
pub use telemetry::{Telemetry, WorkloadStatus, WorkloadTelemetry};
