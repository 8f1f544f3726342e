//! Error types for utilization reads.

use thiserror::Error;

/// Result type alias for metric queries.
pub type MetricResult<T> = Result<T, MetricError>;

/// Why a utilization read could not produce a value. Every variant is
/// recovered by substituting the `0.0` sentinel sample.
#[derive(Debug, Error)]
pub enum MetricError {
    #[error("metrics backend unavailable: {0}")]
    Unavailable(String),

    #[error("malformed metrics response: {0}")]
    Malformed(String),

    #[error("no series matched query {0}")]
    NoData(String),

    #[error("metrics query timed out after {0:?}")]
    Timeout(std::time::Duration),
}
