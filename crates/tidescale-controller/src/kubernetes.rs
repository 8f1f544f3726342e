//! Kubernetes deployment scale subresource.
//!
//! Reads `spec.replicas` with
//! `GET /apis/apps/v1/namespaces/{ns}/deployments/{name}/scale` and writes
//! it with a JSON merge patch to the same path. A merge patch carrying the
//! current count is a no-op on the API server.

use std::time::Duration;

use bytes::Bytes;
use http::{Method, StatusCode};
use serde::Deserialize;
use tracing::debug;

use tidescale_core::config::ControllerSettings;
use tidescale_core::http::{HttpEndpoint, HttpResponse};
use tidescale_core::{BoxFuture, Workload};

use crate::WorkloadController;
use crate::error::{ControllerError, ControllerResult};

#[derive(Debug, Deserialize)]
struct Scale {
    #[serde(default)]
    spec: ScaleSpec,
}

#[derive(Debug, Default, Deserialize)]
struct ScaleSpec {
    /// Omitted by the API server when zero.
    #[serde(default)]
    replicas: u32,
}

#[derive(Debug, Deserialize)]
struct Status {
    #[serde(default)]
    message: String,
}

/// Scales deployments through the Kubernetes API server.
#[derive(Debug)]
pub struct KubernetesController {
    endpoint: HttpEndpoint,
    authorization: Option<String>,
    timeout: Duration,
}

impl KubernetesController {
    pub fn new(settings: &ControllerSettings) -> ControllerResult<Self> {
        let endpoint = HttpEndpoint::parse(&settings.api_server)
            .map_err(|e| ControllerError::Config(e.to_string()))?;
        Ok(Self {
            endpoint,
            authorization: settings.token.as_ref().map(|t| format!("Bearer {t}")),
            timeout: settings.timeout,
        })
    }

    fn scale_path(workload: &Workload) -> String {
        format!(
            "/apis/apps/v1/namespaces/{}/deployments/{}/scale",
            workload.namespace, workload.name
        )
    }

    async fn call(
        &self,
        method: Method,
        workload: &Workload,
        content_type: Option<&str>,
        body: Option<Bytes>,
    ) -> ControllerResult<Result<HttpResponse, String>> {
        let mut headers = Vec::new();
        if let Some(auth) = &self.authorization {
            headers.push(("authorization", auth.as_str()));
        }
        if let Some(ct) = content_type {
            headers.push(("content-type", ct));
        }

        let path = Self::scale_path(workload);
        let fut = self.endpoint.send(method, &path, &headers, body);
        match tokio::time::timeout(self.timeout, fut).await {
            Err(_) => Err(ControllerError::Timeout(self.timeout)),
            Ok(result) => Ok(result.map_err(|e| e.to_string())),
        }
    }
}

/// Best-effort extraction of the API server's `Status.message`.
fn failure_reason(resp: &HttpResponse) -> String {
    let message = serde_json::from_slice::<Status>(&resp.body)
        .map(|s| s.message)
        .unwrap_or_default();
    if message.is_empty() {
        format!("HTTP {}", resp.status)
    } else {
        format!("HTTP {}: {message}", resp.status)
    }
}

impl WorkloadController for KubernetesController {
    fn current_replicas<'a>(&'a self, workload: &'a Workload) -> BoxFuture<'a, ControllerResult<u32>> {
        Box::pin(async move {
            let resp = self
                .call(Method::GET, workload, None, None)
                .await?
                .map_err(|e| ControllerError::lookup(workload, e))?;

            if resp.status == StatusCode::NOT_FOUND {
                return Err(ControllerError::lookup(workload, "deployment not found"));
            }
            if !resp.status.is_success() {
                return Err(ControllerError::lookup(workload, failure_reason(&resp)));
            }

            let scale: Scale = serde_json::from_slice(&resp.body).map_err(|e| {
                ControllerError::lookup(workload, format!("malformed scale object: {e}"))
            })?;
            debug!(%workload, replicas = scale.spec.replicas, "read replica count");
            Ok(scale.spec.replicas)
        })
    }

    fn set_replicas<'a>(
        &'a self,
        workload: &'a Workload,
        replicas: u32,
    ) -> BoxFuture<'a, ControllerResult<()>> {
        Box::pin(async move {
            let patch = serde_json::json!({ "spec": { "replicas": replicas } });
            let body = Bytes::from(patch.to_string());

            let resp = self
                .call(
                    Method::PATCH,
                    workload,
                    Some("application/merge-patch+json"),
                    Some(body),
                )
                .await?
                .map_err(|e| ControllerError::scale_command(workload, e))?;

            if !resp.status.is_success() {
                return Err(ControllerError::scale_command(workload, failure_reason(&resp)));
            }
            debug!(%workload, replicas, "replica count patched");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tidescale_core::config::ControllerKind;
    use tidescale_core::http::test_server::{serve_once, serve_silent};

    fn settings(api_server: String, token: Option<&str>) -> ControllerSettings {
        ControllerSettings {
            kind: ControllerKind::Kubernetes,
            api_server,
            token: token.map(str::to_string),
            timeout: Duration::from_millis(500),
            replicas: HashMap::new(),
        }
    }

    fn api() -> Workload {
        Workload::new("shop", "api")
    }

    #[tokio::test]
    async fn reads_spec_replicas() {
        let body = r#"{"kind":"Scale","apiVersion":"autoscaling/v1","spec":{"replicas":3},"status":{"replicas":3}}"#;
        let (addr, server) = serve_once(200, body).await;
        let controller =
            KubernetesController::new(&settings(format!("http://{addr}"), Some("tok"))).unwrap();

        assert_eq!(controller.current_replicas(&api()).await.unwrap(), 3);

        let req = server.await.unwrap();
        assert_eq!(
            req.request_line,
            "GET /apis/apps/v1/namespaces/shop/deployments/api/scale HTTP/1.1"
        );
        assert_eq!(req.header("authorization"), Some("Bearer tok"));
    }

    #[tokio::test]
    async fn omitted_replicas_read_as_zero() {
        let (addr, _server) = serve_once(200, r#"{"kind":"Scale","spec":{}}"#).await;
        let controller = KubernetesController::new(&settings(format!("http://{addr}"), None)).unwrap();
        assert_eq!(controller.current_replicas(&api()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_deployment_is_lookup_failure() {
        let body = r#"{"kind":"Status","status":"Failure","message":"deployments.apps \"api\" not found","code":404}"#;
        let (addr, _server) = serve_once(404, body).await;
        let controller = KubernetesController::new(&settings(format!("http://{addr}"), None)).unwrap();

        let err = controller.current_replicas(&api()).await.unwrap_err();
        assert!(matches!(err, ControllerError::Lookup { .. }));
    }

    #[tokio::test]
    async fn forbidden_read_carries_status_message() {
        let body = r#"{"kind":"Status","message":"forbidden: user cannot get"}"#;
        let (addr, _server) = serve_once(403, body).await;
        let controller = KubernetesController::new(&settings(format!("http://{addr}"), None)).unwrap();

        let err = controller.current_replicas(&api()).await.unwrap_err();
        assert!(err.to_string().contains("forbidden"));
    }

    #[tokio::test]
    async fn patch_sends_merge_patch() {
        let (addr, server) = serve_once(200, r#"{"spec":{"replicas":4}}"#).await;
        let controller = KubernetesController::new(&settings(format!("http://{addr}"), None)).unwrap();

        controller.set_replicas(&api(), 4).await.unwrap();

        let req = server.await.unwrap();
        assert!(req.request_line.starts_with("PATCH /apis/apps/v1/namespaces/shop/deployments/api/scale"));
        assert_eq!(req.header("content-type"), Some("application/merge-patch+json"));
        let sent: serde_json::Value = serde_json::from_str(&req.body).unwrap();
        assert_eq!(sent["spec"]["replicas"], 4);
        assert!(req.header("authorization").is_none());
    }

    #[tokio::test]
    async fn rejected_patch_is_scale_command_failure() {
        let body = r#"{"kind":"Status","message":"admission webhook denied"}"#;
        let (addr, _server) = serve_once(422, body).await;
        let controller = KubernetesController::new(&settings(format!("http://{addr}"), None)).unwrap();

        let err = controller.set_replicas(&api(), 4).await.unwrap_err();
        assert!(matches!(err, ControllerError::ScaleCommand { ref reason, .. } if reason.contains("denied")));
    }

    #[tokio::test]
    async fn unreachable_api_server_is_lookup_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let controller = KubernetesController::new(&settings(format!("http://{addr}"), None)).unwrap();
        assert!(matches!(
            controller.current_replicas(&api()).await,
            Err(ControllerError::Lookup { .. })
        ));
    }

    #[tokio::test]
    async fn hung_api_server_times_out() {
        let (addr, _server) = serve_silent().await;
        let controller = KubernetesController::new(&settings(format!("http://{addr}"), None)).unwrap();

        assert!(matches!(
            controller.set_replicas(&api(), 2).await,
            Err(ControllerError::Timeout(_))
        ));
    }

    #[test]
    fn https_api_server_is_config_error() {
        let err = KubernetesController::new(&settings("https://10.0.0.1:6443".into(), None))
            .unwrap_err();
        assert!(matches!(err, ControllerError::Config(_)));
    }
}
