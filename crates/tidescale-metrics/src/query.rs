//! Prometheus instant-query source.
//!
//! Issues `GET /api/v1/query?query=<metric>{deployment="<name>"}` and
//! reads the first series of the returned vector. Any failure (connect
//! error, timeout, non-2xx, malformed body, empty result, negative value)
//! yields the `0.0` sentinel sample.

use std::time::Duration;

use http::Method;
use serde::Deserialize;
use tracing::debug;

use tidescale_core::config::MetricsSettings;
use tidescale_core::http::HttpEndpoint;
use tidescale_core::{
    BoxFuture, MetricKind, SharedClock, UtilizationSample, Workload, system_clock,
};

use crate::error::{MetricError, MetricResult};
use crate::source::MetricsSource;

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<VectorSample>,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    /// `[unix_seconds, "value"]`
    value: (f64, String),
}

/// Reads utilization from a Prometheus server.
#[derive(Debug)]
pub struct PrometheusSource {
    endpoint: HttpEndpoint,
    cpu_query: String,
    memory_query: String,
    timeout: Duration,
    clock: SharedClock,
}

impl PrometheusSource {
    pub fn new(settings: &MetricsSettings) -> MetricResult<Self> {
        let endpoint = HttpEndpoint::parse(&settings.endpoint)
            .map_err(|e| MetricError::Unavailable(e.to_string()))?;
        Ok(Self {
            endpoint,
            cpu_query: settings.cpu_query.clone(),
            memory_query: settings.memory_query.clone(),
            timeout: settings.timeout,
            clock: system_clock(),
        })
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// The PromQL selector for `kind` on `workload`.
    pub fn selector(&self, kind: MetricKind, workload: &Workload) -> String {
        let metric = match kind {
            MetricKind::Cpu => &self.cpu_query,
            MetricKind::Memory => &self.memory_query,
        };
        let name = workload.name.replace('\\', "\\\\").replace('"', "\\\"");
        format!("{metric}{{deployment=\"{name}\"}}")
    }

    /// Run the instant query, returning the value and the server's
    /// timestamp for it.
    pub async fn query(&self, kind: MetricKind, workload: &Workload) -> MetricResult<(f64, u64)> {
        let selector = self.selector(kind, workload);
        let path = format!("/api/v1/query?query={}", urlencoding::encode(&selector));

        let fut = self.endpoint.send(Method::GET, &path, &[], None);
        let resp = tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| MetricError::Timeout(self.timeout))?
            .map_err(|e| MetricError::Unavailable(e.to_string()))?;

        let parsed: QueryResponse = serde_json::from_slice(&resp.body).map_err(|e| {
            if resp.status.is_success() {
                MetricError::Malformed(e.to_string())
            } else {
                MetricError::Unavailable(format!("HTTP {}", resp.status))
            }
        })?;

        if !resp.status.is_success() || parsed.status != "success" {
            return Err(MetricError::Unavailable(format!(
                "HTTP {}: {}",
                resp.status,
                parsed.error.unwrap_or_else(|| parsed.status.clone())
            )));
        }

        let first = parsed
            .data
            .and_then(|d| d.result.into_iter().next())
            .ok_or_else(|| MetricError::NoData(selector.clone()))?;

        let (ts, raw) = first.value;
        let value: f64 = raw
            .parse()
            .map_err(|_| MetricError::Malformed(format!("value {raw:?} is not a number")))?;
        if !value.is_finite() || value < 0.0 {
            return Err(MetricError::Malformed(format!(
                "value {raw:?} is not a non-negative finite number"
            )));
        }

        let timestamp = if ts.is_finite() && ts > 0.0 {
            ts as u64
        } else {
            self.clock.now_secs()
        };
        Ok((value, timestamp))
    }
}

impl MetricsSource for PrometheusSource {
    fn sample<'a>(
        &'a self,
        kind: MetricKind,
        workload: &'a Workload,
    ) -> BoxFuture<'a, UtilizationSample> {
        Box::pin(async move {
            match self.query(kind, workload).await {
                Ok((value, timestamp)) => UtilizationSample::new(kind, workload, value, timestamp),
                Err(e) => {
                    debug!(%workload, metric = %kind, error = %e, "prometheus query failed");
                    UtilizationSample::sentinel(kind, workload, self.clock.now_secs())
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tidescale_core::ManualClock;
    use tidescale_core::http::test_server::{serve_once, serve_silent};

    fn settings(endpoint: String) -> MetricsSettings {
        MetricsSettings {
            endpoint,
            cpu_query: "cpu_usage".to_string(),
            memory_query: "memory_usage".to_string(),
            timeout: Duration::from_millis(500),
        }
    }

    fn api() -> Workload {
        Workload::new("default", "api")
    }

    #[test]
    fn selector_uses_deployment_label() {
        let source = PrometheusSource::new(&settings("http://localhost:9090".into())).unwrap();
        assert_eq!(
            source.selector(MetricKind::Cpu, &api()),
            r#"cpu_usage{deployment="api"}"#
        );
        assert_eq!(
            source.selector(MetricKind::Memory, &api()),
            r#"memory_usage{deployment="api"}"#
        );
    }

    #[test]
    fn https_endpoint_is_rejected() {
        assert!(PrometheusSource::new(&settings("https://prom:9090".into())).is_err());
    }

    #[tokio::test]
    async fn reads_first_vector_value() {
        let body = r#"{"status":"success","data":{"resultType":"vector","result":[
            {"metric":{"deployment":"api"},"value":[1712000000.5,"0.82"]},
            {"metric":{"deployment":"api"},"value":[1712000000.5,"0.10"]}
        ]}}"#;
        let (addr, server) = serve_once(200, body).await;
        let source = PrometheusSource::new(&settings(format!("http://{addr}"))).unwrap();

        let sample = source.sample(MetricKind::Cpu, &api()).await;
        assert_eq!(sample.value, 0.82);
        assert_eq!(sample.timestamp, 1_712_000_000);
        assert!(!sample.degraded);

        let req = server.await.unwrap();
        assert!(req.request_line.starts_with("GET /api/v1/query?query=cpu_usage%7Bdeployment%3D%22api%22%7D"));
    }

    #[tokio::test]
    async fn values_above_one_are_clamped() {
        let body = r#"{"status":"success","data":{"result":[{"value":[1.0,"1.4"]}]}}"#;
        let (addr, _server) = serve_once(200, body).await;
        let source = PrometheusSource::new(&settings(format!("http://{addr}"))).unwrap();

        let sample = source.sample(MetricKind::Memory, &api()).await;
        assert_eq!(sample.value, 1.0);
        assert!(!sample.degraded);
    }

    #[tokio::test]
    async fn empty_result_is_sentinel() {
        let body = r#"{"status":"success","data":{"resultType":"vector","result":[]}}"#;
        let (addr, _server) = serve_once(200, body).await;
        let source = PrometheusSource::new(&settings(format!("http://{addr}")))
            .unwrap()
            .with_clock(Arc::new(ManualClock::new(77)));

        let sample = source.sample(MetricKind::Cpu, &api()).await;
        assert_eq!(sample.value, 0.0);
        assert!(sample.degraded);
        assert_eq!(sample.timestamp, 77);
    }

    #[tokio::test]
    async fn error_status_is_unavailable() {
        let body = r#"{"status":"error","errorType":"bad_data","error":"parse error"}"#;
        let (addr, _server) = serve_once(400, body).await;
        let source = PrometheusSource::new(&settings(format!("http://{addr}"))).unwrap();

        let err = source.query(MetricKind::Cpu, &api()).await.unwrap_err();
        assert!(matches!(err, MetricError::Unavailable(ref m) if m.contains("parse error")));
    }

    #[tokio::test]
    async fn malformed_body_is_sentinel() {
        let (addr, _server) = serve_once(200, "<html>oops</html>").await;
        let source = PrometheusSource::new(&settings(format!("http://{addr}"))).unwrap();

        let err = source.query(MetricKind::Cpu, &api()).await.unwrap_err();
        assert!(matches!(err, MetricError::Malformed(_)));
    }

    #[tokio::test]
    async fn negative_value_is_rejected() {
        let body = r#"{"status":"success","data":{"result":[{"value":[1.0,"-0.3"]}]}}"#;
        let (addr, _server) = serve_once(200, body).await;
        let source = PrometheusSource::new(&settings(format!("http://{addr}"))).unwrap();

        let sample = source.sample(MetricKind::Cpu, &api()).await;
        assert!(sample.degraded);
        assert_eq!(sample.value, 0.0);
    }

    #[tokio::test]
    async fn unreachable_backend_is_sentinel() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let source = PrometheusSource::new(&settings(format!("http://{addr}"))).unwrap();
        let sample = source.sample(MetricKind::Memory, &api()).await;
        assert!(sample.degraded);
    }

    #[tokio::test]
    async fn hung_backend_times_out() {
        let (addr, _server) = serve_silent().await;
        let source = PrometheusSource::new(&settings(format!("http://{addr}"))).unwrap();

        let err = source.query(MetricKind::Cpu, &api()).await.unwrap_err();
        assert!(matches!(err, MetricError::Timeout(_)));
    }
}
