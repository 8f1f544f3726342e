//! Error types for workload controllers.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for controller operations.
pub type ControllerResult<T> = Result<T, ControllerError>;

#[derive(Debug, Error)]
pub enum ControllerError {
    /// The workload does not exist or its replica count could not be read.
    #[error("lookup failed for {workload}: {reason}")]
    Lookup { workload: String, reason: String },

    /// A replica write failed or was rejected.
    #[error("scale command failed for {workload}: {reason}")]
    ScaleCommand { workload: String, reason: String },

    #[error("controller call timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid controller configuration: {0}")]
    Config(String),
}

impl ControllerError {
    pub fn lookup(workload: impl ToString, reason: impl Into<String>) -> Self {
        Self::Lookup {
            workload: workload.to_string(),
            reason: reason.into(),
        }
    }

    pub fn scale_command(workload: impl ToString, reason: impl Into<String>) -> Self {
        Self::ScaleCommand {
            workload: workload.to_string(),
            reason: reason.into(),
        }
    }
}
