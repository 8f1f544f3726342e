//! Domain types shared by the control loop and its collaborators.
//!
//! A `Workload` is the identity the loop scales, a `UtilizationSample` is
//! one metric reading for one cycle, `ScalingParams` are the fixed policy
//! parameters, and `Action` is what the policy decides.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Unique identifier for a workload (`namespace/name`).
pub type WorkloadId = String;

// ── Workload ──────────────────────────────────────────────────────

/// A scalable unit of compute, e.g. a Kubernetes deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Workload {
    pub namespace: String,
    pub name: String,
}

impl Workload {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// The `namespace/name` identifier.
    pub fn id(&self) -> WorkloadId {
        format!("{}/{}", self.namespace, self.name)
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// ── Utilization ───────────────────────────────────────────────────

/// Which resource a sample measures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Cpu,
    Memory,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Cpu => "cpu",
            MetricKind::Memory => "memory",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A point-in-time utilization reading for one workload.
///
/// `value` is always a finite fraction in `[0.0, 1.0]`. A sample taken
/// while the metrics backend was unreachable carries the `0.0` sentinel
/// and has `degraded` set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UtilizationSample {
    pub kind: MetricKind,
    pub workload: WorkloadId,
    pub value: f64,
    /// Unix timestamp (seconds) of the reading.
    pub timestamp: u64,
    /// True when the value is the sentinel substituted for a failed read.
    pub degraded: bool,
}

impl UtilizationSample {
    /// Build a sample, clamping `value` into `[0.0, 1.0]`. Non-finite
    /// values collapse to `0.0`.
    pub fn new(kind: MetricKind, workload: &Workload, value: f64, timestamp: u64) -> Self {
        let value = if value.is_finite() {
            value.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            kind,
            workload: workload.id(),
            value,
            timestamp,
            degraded: false,
        }
    }

    /// The "unknown, treated as idle" sample used when a read fails.
    pub fn sentinel(kind: MetricKind, workload: &Workload, timestamp: u64) -> Self {
        Self {
            kind,
            workload: workload.id(),
            value: 0.0,
            timestamp,
            degraded: true,
        }
    }
}

// ── Scaling parameters ────────────────────────────────────────────

/// Threshold policy parameters for one workload. Fixed for the life of
/// the loop that uses them.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingParams {
    pub min_replicas: u32,
    pub max_replicas: u32,
    /// Scale up when CPU utilization is strictly above this fraction.
    pub cpu_threshold: f64,
    /// Scale up when memory utilization is strictly above this fraction.
    pub memory_threshold: f64,
    /// Replica delta per decision.
    pub step: u32,
    pub poll_interval: Duration,
}

impl Default for ScalingParams {
    fn default() -> Self {
        Self {
            min_replicas: 1,
            max_replicas: 10,
            cpu_threshold: 0.75,
            memory_threshold: 0.75,
            step: 1,
            poll_interval: Duration::from_secs(60),
        }
    }
}

impl ScalingParams {
    /// Check the parameter invariants: `0 < min <= max`, thresholds in
    /// `(0.0, 1.0]`, a positive step and a positive poll interval.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.min_replicas == 0 {
            return Err(ConfigError::Invalid(
                "min_replicas must be greater than zero".to_string(),
            ));
        }
        if self.min_replicas > self.max_replicas {
            return Err(ConfigError::Invalid(format!(
                "min_replicas ({}) exceeds max_replicas ({})",
                self.min_replicas, self.max_replicas
            )));
        }
        for (name, value) in [
            ("cpu_threshold", self.cpu_threshold),
            ("memory_threshold", self.memory_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be in (0.0, 1.0], got {value}"
                )));
            }
        }
        if self.step == 0 {
            return Err(ConfigError::Invalid("step must be at least 1".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "poll_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// A workload paired with the parameters its loop runs under.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadSpec {
    pub workload: Workload,
    pub params: ScalingParams,
}

// ── Decisions ─────────────────────────────────────────────────────

/// The outcome of a policy evaluation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", content = "target", rename_all = "snake_case")]
pub enum Action {
    /// Raise the desired replica count to the given value.
    ScaleUp(u32),
    /// Lower the desired replica count to the given value.
    ScaleDown(u32),
    /// Leave the replica count alone.
    Hold,
}

impl Action {
    /// Target replica count, if this action writes one.
    pub fn target(&self) -> Option<u32> {
        match self {
            Action::ScaleUp(n) | Action::ScaleDown(n) => Some(*n),
            Action::Hold => None,
        }
    }

    /// `1` for up, `-1` for down, `0` for hold.
    pub fn direction(&self) -> i64 {
        match self {
            Action::ScaleUp(_) => 1,
            Action::ScaleDown(_) => -1,
            Action::Hold => 0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Action::ScaleUp(_) => "scale_up",
            Action::ScaleDown(_) => "scale_down",
            Action::Hold => "hold",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::ScaleUp(n) => write!(f, "scale up to {n}"),
            Action::ScaleDown(n) => write!(f, "scale down to {n}"),
            Action::Hold => f.write_str("hold"),
        }
    }
}
