//! tidescale.toml configuration parser.
//!
//! The file is read once at startup and resolved into a `ResolvedConfig`
//! that is passed by reference to everything that needs it. Every section
//! is optional; missing values fall back to the defaults below.

use std::collections::HashMap;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::http::HttpEndpoint;
use crate::types::{ScalingParams, Workload, WorkloadId, WorkloadSpec};

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8001";
pub const DEFAULT_METRICS_ENDPOINT: &str = "http://localhost:9090";
pub const DEFAULT_CPU_QUERY: &str = "cpu_usage";
pub const DEFAULT_MEMORY_QUERY: &str = "memory_usage";
pub const DEFAULT_API_SERVER: &str = "http://127.0.0.1:8080";
pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TideConfig {
    pub server: Option<ServerConfig>,
    pub metrics: Option<MetricsConfig>,
    pub controller: Option<ControllerConfig>,
    pub defaults: Option<ScalingConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workloads: Vec<WorkloadConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub endpoint: Option<String>,
    pub cpu_query: Option<String>,
    pub memory_query: Option<String>,
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub kind: Option<String>,
    pub api_server: Option<String>,
    pub token: Option<String>,
    pub timeout: Option<String>,
    /// Starting replica counts for the in-memory controller, keyed by
    /// `namespace/name`.
    pub replicas: Option<HashMap<String, u32>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScalingConfig {
    pub min_replicas: Option<u32>,
    pub max_replicas: Option<u32>,
    pub cpu_threshold: Option<f64>,
    pub memory_threshold: Option<f64>,
    pub step: Option<u32>,
    pub poll_interval: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadConfig {
    pub name: String,
    pub namespace: Option<String>,
    #[serde(flatten)]
    pub scaling: ScalingConfig,
}

// ── Resolved form ─────────────────────────────────────────────────

/// Fully-defaulted, validated configuration.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub listen: SocketAddr,
    pub metrics: MetricsSettings,
    pub controller: ControllerSettings,
    pub workloads: Vec<WorkloadSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSettings {
    pub endpoint: String,
    pub cpu_query: String,
    pub memory_query: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerKind {
    Kubernetes,
    Memory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSettings {
    pub kind: ControllerKind,
    pub api_server: String,
    pub token: Option<String>,
    pub timeout: Duration,
    pub replicas: HashMap<WorkloadId, u32>,
}

impl TideConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Scaffold a config that scales a single deployment with the
    /// default policy.
    pub fn scaffold(namespace: &str, name: &str) -> Self {
        let defaults = ScalingParams::default();
        TideConfig {
            server: Some(ServerConfig {
                listen: Some(DEFAULT_LISTEN.to_string()),
            }),
            metrics: Some(MetricsConfig {
                endpoint: Some(DEFAULT_METRICS_ENDPOINT.to_string()),
                cpu_query: Some(DEFAULT_CPU_QUERY.to_string()),
                memory_query: Some(DEFAULT_MEMORY_QUERY.to_string()),
                timeout: Some("5s".to_string()),
            }),
            controller: Some(ControllerConfig {
                kind: Some("kubernetes".to_string()),
                api_server: Some(DEFAULT_API_SERVER.to_string()),
                token: None,
                timeout: Some("5s".to_string()),
                replicas: None,
            }),
            defaults: Some(ScalingConfig {
                min_replicas: Some(defaults.min_replicas),
                max_replicas: Some(defaults.max_replicas),
                cpu_threshold: Some(defaults.cpu_threshold),
                memory_threshold: Some(defaults.memory_threshold),
                step: Some(defaults.step),
                poll_interval: Some("60s".to_string()),
            }),
            workloads: vec![WorkloadConfig {
                name: name.to_string(),
                namespace: Some(namespace.to_string()),
                scaling: ScalingConfig::default(),
            }],
        }
    }

    /// Apply defaults and validate everything.
    pub fn resolve(&self) -> ConfigResult<ResolvedConfig> {
        let server = self.server.clone().unwrap_or_default();
        let listen_str = server.listen.as_deref().unwrap_or(DEFAULT_LISTEN);
        let listen: SocketAddr = listen_str
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("server.listen {listen_str:?}: {e}")))?;

        let metrics = self.resolve_metrics()?;
        let controller = self.resolve_controller()?;

        if self.workloads.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one [[workloads]] entry is required".to_string(),
            ));
        }

        let base = self.defaults.clone().unwrap_or_default();
        let mut seen = HashSet::new();
        let mut workloads = Vec::with_capacity(self.workloads.len());

        for entry in &self.workloads {
            if entry.name.trim().is_empty() {
                return Err(ConfigError::Invalid("workload name is empty".to_string()));
            }
            let namespace = entry.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE);
            if !is_dns_label(namespace) {
                return Err(ConfigError::Invalid(format!(
                    "workload {:?}: namespace {namespace:?} is not a valid DNS-1123 label",
                    entry.name
                )));
            }
            if !is_dns_subdomain(&entry.name) {
                return Err(ConfigError::Invalid(format!(
                    "workload name {:?} is not a valid DNS-1123 subdomain",
                    entry.name
                )));
            }
            let workload = Workload::new(namespace, entry.name.as_str());
            if !seen.insert(workload.id()) {
                return Err(ConfigError::Invalid(format!(
                    "workload {workload} is listed more than once"
                )));
            }

            let params = merge_params(&base, &entry.scaling)
                .map_err(|e| ConfigError::Invalid(format!("workload {workload}: {e}")))?;
            params
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("workload {workload}: {e}")))?;

            workloads.push(WorkloadSpec { workload, params });
        }

        Ok(ResolvedConfig {
            listen,
            metrics,
            controller,
            workloads,
        })
    }

    fn resolve_metrics(&self) -> ConfigResult<MetricsSettings> {
        let m = self.metrics.clone().unwrap_or_default();
        let endpoint = m
            .endpoint
            .unwrap_or_else(|| DEFAULT_METRICS_ENDPOINT.to_string());
        HttpEndpoint::parse(&endpoint)
            .map_err(|e| ConfigError::Invalid(format!("metrics.endpoint: {e}")))?;

        Ok(MetricsSettings {
            endpoint,
            cpu_query: m.cpu_query.unwrap_or_else(|| DEFAULT_CPU_QUERY.to_string()),
            memory_query: m
                .memory_query
                .unwrap_or_else(|| DEFAULT_MEMORY_QUERY.to_string()),
            timeout: duration_or(m.timeout.as_deref(), DEFAULT_CALL_TIMEOUT, "metrics.timeout")?,
        })
    }

    fn resolve_controller(&self) -> ConfigResult<ControllerSettings> {
        let c = self.controller.clone().unwrap_or_default();
        let kind = match c.kind.as_deref().unwrap_or("kubernetes") {
            "kubernetes" | "k8s" => ControllerKind::Kubernetes,
            "memory" => ControllerKind::Memory,
            other => {
                return Err(ConfigError::Invalid(format!(
                    "controller.kind {other:?} (expected \"kubernetes\" or \"memory\")"
                )));
            }
        };

        let api_server = c
            .api_server
            .unwrap_or_else(|| DEFAULT_API_SERVER.to_string());
        if kind == ControllerKind::Kubernetes {
            HttpEndpoint::parse(&api_server)
                .map_err(|e| ConfigError::Invalid(format!("controller.api_server: {e}")))?;
        }

        Ok(ControllerSettings {
            kind,
            api_server,
            token: c.token.filter(|t| !t.is_empty()),
            timeout: duration_or(
                c.timeout.as_deref(),
                DEFAULT_CALL_TIMEOUT,
                "controller.timeout",
            )?,
            replicas: c.replicas.unwrap_or_default(),
        })
    }
}

fn merge_params(base: &ScalingConfig, over: &ScalingConfig) -> Result<ScalingParams, String> {
    let defaults = ScalingParams::default();
    let poll = over
        .poll_interval
        .as_deref()
        .or(base.poll_interval.as_deref());
    let poll_interval = match poll {
        Some(s) => parse_duration(s).ok_or_else(|| format!("poll_interval {s:?} is not a duration"))?,
        None => defaults.poll_interval,
    };

    Ok(ScalingParams {
        min_replicas: over
            .min_replicas
            .or(base.min_replicas)
            .unwrap_or(defaults.min_replicas),
        max_replicas: over
            .max_replicas
            .or(base.max_replicas)
            .unwrap_or(defaults.max_replicas),
        cpu_threshold: over
            .cpu_threshold
            .or(base.cpu_threshold)
            .unwrap_or(defaults.cpu_threshold),
        memory_threshold: over
            .memory_threshold
            .or(base.memory_threshold)
            .unwrap_or(defaults.memory_threshold),
        step: over.step.or(base.step).unwrap_or(defaults.step),
        poll_interval,
    })
}

/// Lowercase alphanumerics and `-`, starting and ending alphanumeric,
/// at most 63 characters. Kubernetes namespaces follow this rule.
fn is_dns_label(s: &str) -> bool {
    let bytes = s.as_bytes();
    !bytes.is_empty()
        && bytes.len() <= 63
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        && bytes[0] != b'-'
        && bytes[bytes.len() - 1] != b'-'
}

/// Dot-separated DNS labels, at most 253 characters. Deployment names
/// follow this rule.
fn is_dns_subdomain(s: &str) -> bool {
    s.len() <= 253 && s.split('.').all(is_dns_label)
}

fn duration_or(value: Option<&str>, default: Duration, field: &str) -> ConfigResult<Duration> {
    match value {
        None => Ok(default),
        Some(s) => match parse_duration(s) {
            Some(d) if !d.is_zero() => Ok(d),
            _ => Err(ConfigError::Invalid(format!(
                "{field} {s:?} is not a positive duration"
            ))),
        },
    }
}

/// Parse a duration string like "500ms", "30s", "5m", "1h", or bare
/// seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else if let Some(hours) = s.strip_suffix('h') {
        hours
            .trim()
            .parse::<u64>()
            .ok()
            .and_then(|h| h.checked_mul(3600))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
