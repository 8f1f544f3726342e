//! Daemon assembly: collaborators from config, one control loop per
//! workload, and the telemetry API server.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use tidescale_autoscale::Supervisor;
use tidescale_controller::{InMemoryController, KubernetesController, WorkloadController};
use tidescale_core::config::{ControllerKind, ResolvedConfig};
use tidescale_core::WorkloadSpec;
use tidescale_metrics::{MetricsSource, PrometheusSource, Telemetry};

/// Everything `tidescaled run` needs, wired together but not yet started.
pub struct Daemon {
    supervisor: Supervisor,
    workloads: Vec<WorkloadSpec>,
}

impl Daemon {
    /// Build the Prometheus source and the configured controller.
    pub fn from_config(config: &ResolvedConfig) -> anyhow::Result<Self> {
        let source: Arc<dyn MetricsSource> = Arc::new(PrometheusSource::new(&config.metrics)?);
        info!(endpoint = %config.metrics.endpoint, "metrics source initialized");

        let controller = build_controller(config)?;
        Ok(Self::with_collaborators(config, source, controller))
    }

    /// Assemble around externally built collaborators.
    pub fn with_collaborators(
        config: &ResolvedConfig,
        source: Arc<dyn MetricsSource>,
        controller: Arc<dyn WorkloadController>,
    ) -> Self {
        let supervisor = Supervisor::new(source, controller, Telemetry::new())
            .with_timeouts(config.metrics.timeout, config.controller.timeout);
        Self {
            supervisor,
            workloads: config.workloads.clone(),
        }
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn router(&self) -> axum::Router {
        tidescale_api::build_router(self.supervisor.telemetry().clone())
    }

    /// Spawn a control loop for every configured workload.
    pub async fn start_loops(&self) {
        for spec in &self.workloads {
            self.supervisor.start(spec.clone()).await;
        }
        info!(workloads = self.workloads.len(), "control loops started");
    }

    /// Bind `listen`, start the loops, serve the API until `signal`
    /// resolves, then stop every loop. No loop runs if the bind fails.
    pub async fn serve(
        self,
        listen: SocketAddr,
        signal: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(listen).await?;
        info!(addr = %listener.local_addr()?, "API server listening");

        self.start_loops().await;

        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                signal.await;
                info!("shutdown signal received");
            })
            .await;

        // Stop the loops before surfacing a server error.
        self.supervisor.stop_all().await;
        result?;
        info!("tidescale daemon stopped");
        Ok(())
    }
}

fn build_controller(config: &ResolvedConfig) -> anyhow::Result<Arc<dyn WorkloadController>> {
    let controller: Arc<dyn WorkloadController> = match config.controller.kind {
        ControllerKind::Kubernetes => {
            info!(api_server = %config.controller.api_server, "kubernetes controller initialized");
            Arc::new(KubernetesController::new(&config.controller)?)
        }
        ControllerKind::Memory => {
            info!("in-memory controller initialized (dry run)");
            Arc::new(seeded_memory_controller(config))
        }
    };
    Ok(controller)
}

/// Seed each workload from `controller.replicas`, falling back to its
/// minimum.
fn seeded_memory_controller(config: &ResolvedConfig) -> InMemoryController {
    InMemoryController::from_counts(config.workloads.iter().map(|spec| {
        let id = spec.workload.id();
        let replicas = config
            .controller
            .replicas
            .get(&id)
            .copied()
            .unwrap_or(spec.params.min_replicas);
        (id, replicas)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tidescale_core::{TideConfig, Workload};

    fn memory_config() -> ResolvedConfig {
        TideConfig::from_toml_str(
            r#"
[server]
listen = "127.0.0.1:0"

[controller]
kind = "memory"
timeout = "2s"

[controller.replicas]
"default/api" = 4

[defaults]
min_replicas = 2

[[workloads]]
name = "api"

[[workloads]]
name = "worker"
namespace = "jobs"
"#,
        )
        .unwrap()
        .resolve()
        .unwrap()
    }

    #[test]
    fn memory_controller_seeds_from_config_then_min() {
        let controller = seeded_memory_controller(&memory_config());
        assert_eq!(controller.replicas(&Workload::new("default", "api")), Some(4));
        assert_eq!(controller.replicas(&Workload::new("jobs", "worker")), Some(2));
    }

    #[test]
    fn from_config_builds_both_collaborators() {
        let config = memory_config();
        assert!(Daemon::from_config(&config).is_ok());

        let mut k8s = config.clone();
        k8s.controller.kind = ControllerKind::Kubernetes;
        assert!(Daemon::from_config(&k8s).is_ok());
    }

    #[tokio::test]
    async fn serve_stops_loops_on_signal() {
        let config = memory_config();
        let daemon = Daemon::from_config(&config).unwrap();
        let telemetry = daemon.supervisor().telemetry().clone();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(daemon.serve(config.listen, async move {
            let _ = rx.await;
        }));

        // Loops register their telemetry once the listener is bound.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(telemetry.statuses().await.len(), 2);

        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn failed_bind_starts_no_loops() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();

        let config = memory_config();
        let controller = Arc::new(seeded_memory_controller(&config));
        let daemon = Daemon::with_collaborators(
            &config,
            Arc::new(tidescale_metrics::StaticSource::new()),
            controller.clone(),
        );
        let telemetry = daemon.supervisor().telemetry().clone();

        assert!(daemon.serve(addr, async {}).await.is_err());
        assert!(telemetry.statuses().await.is_empty());
        assert_eq!(controller.writes(), 0);
        assert_eq!(controller.replicas(&Workload::new("default", "api")), Some(4));
    }
}
