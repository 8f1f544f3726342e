//! Supervisor — owns one control loop task per workload.
//!
//! Each loop runs on its own tokio task with its own shutdown channel, so
//! workloads can be started and stopped independently. Stopping signals
//! the loop and waits for it to finish its current cycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tidescale_controller::WorkloadController;
use tidescale_core::config::DEFAULT_CALL_TIMEOUT;
use tidescale_core::{SharedClock, WorkloadId, WorkloadSpec, system_clock};
use tidescale_metrics::{MetricsSource, Telemetry};

use crate::scaler::ControlLoop;

/// A running loop.
struct LoopSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl LoopSlot {
    async fn stop(self, workload_id: &str) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            warn!(workload = %workload_id, error = %e, "control loop task ended abnormally");
        }
    }
}

/// Starts, tracks, and stops control loops.
pub struct Supervisor {
    source: Arc<dyn MetricsSource>,
    controller: Arc<dyn WorkloadController>,
    telemetry: Telemetry,
    metric_timeout: Duration,
    controller_timeout: Duration,
    clock: SharedClock,
    /// Active loops: workload id → slot.
    loops: Arc<RwLock<HashMap<WorkloadId, LoopSlot>>>,
}

impl Supervisor {
    pub fn new(
        source: Arc<dyn MetricsSource>,
        controller: Arc<dyn WorkloadController>,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            source,
            controller,
            telemetry,
            metric_timeout: DEFAULT_CALL_TIMEOUT,
            controller_timeout: DEFAULT_CALL_TIMEOUT,
            clock: system_clock(),
            loops: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_timeouts(mut self, metric: Duration, controller: Duration) -> Self {
        self.metric_timeout = metric;
        self.controller_timeout = controller;
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Start a loop for `spec`. A loop already running for the same
    /// workload is stopped and joined before the new one is spawned, so a
    /// workload never has two loops in flight.
    pub async fn start(&self, spec: WorkloadSpec) {
        let workload_id = spec.workload.id();

        let mut loops = self.loops.write().await;
        if let Some(old) = loops.remove(&workload_id) {
            debug!(workload = %workload_id, "replacing running control loop");
            old.stop(&workload_id).await;
        }

        let handle_telemetry = self.telemetry.register(&spec.workload).await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut control_loop =
            ControlLoop::new(spec, self.source.clone(), self.controller.clone())
                .with_telemetry(handle_telemetry)
                .with_timeouts(self.metric_timeout, self.controller_timeout)
                .with_clock(self.clock.clone());

        let handle = tokio::spawn(async move {
            control_loop.run(shutdown_rx).await;
        });
        loops.insert(
            workload_id.clone(),
            LoopSlot {
                handle,
                shutdown_tx,
            },
        );

        info!(workload = %workload_id, "control loop scheduled");
    }

    /// Stop the loop for a workload. Returns false if none was running.
    pub async fn stop(&self, workload_id: &str) -> bool {
        let slot = self.loops.write().await.remove(workload_id);
        match slot {
            Some(slot) => {
                slot.stop(workload_id).await;
                self.telemetry.unregister(workload_id).await;
                info!(workload = %workload_id, "control loop stopped");
                true
            }
            None => false,
        }
    }

    /// Stop every loop (for graceful shutdown).
    pub async fn stop_all(&self) {
        let slots: Vec<(WorkloadId, LoopSlot)> = self.loops.write().await.drain().collect();
        for (id, slot) in slots {
            slot.stop(&id).await;
            debug!(workload = %id, "control loop stopped");
        }
        info!("all control loops stopped");
    }

    /// Workload ids with a running loop, sorted.
    pub async fn active(&self) -> Vec<WorkloadId> {
        let loops = self.loops.read().await;
        let mut ids: Vec<WorkloadId> = loops.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn is_running(&self, workload_id: &str) -> bool {
        self.loops.read().await.contains_key(workload_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tidescale_controller::{ControllerResult, InMemoryController};
    use tidescale_core::{BoxFuture, MetricKind, ScalingParams, Workload};
    use tidescale_metrics::StaticSource;

    fn spec(name: &str) -> WorkloadSpec {
        WorkloadSpec {
            workload: Workload::new("default", name),
            params: ScalingParams::default(),
        }
    }

    fn fixtures() -> (Arc<StaticSource>, Arc<InMemoryController>) {
        let source = Arc::new(StaticSource::new());
        let controller = Arc::new(InMemoryController::new());
        for name in ["api", "worker"] {
            let w = Workload::new("default", name);
            source.set(&w, MetricKind::Cpu, 0.9);
            source.set(&w, MetricKind::Memory, 0.1);
            controller.insert(&w, 2);
        }
        (source, controller)
    }

    #[tokio::test(start_paused = true)]
    async fn start_runs_independent_loops() {
        let (source, controller) = fixtures();
        let supervisor = Supervisor::new(source, controller.clone(), Telemetry::new());

        supervisor.start(spec("api")).await;
        supervisor.start(spec("worker")).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(supervisor.active().await, vec!["default/api", "default/worker"]);
        assert_eq!(controller.replicas(&Workload::new("default", "api")), Some(3));
        assert_eq!(controller.replicas(&Workload::new("default", "worker")), Some(3));

        let statuses = supervisor.telemetry().statuses().await;
        assert_eq!(statuses.len(), 2);
        assert!(statuses.iter().all(|s| s.cycles == 1));

        supervisor.stop_all().await;
        assert!(supervisor.active().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_one_leaves_the_other_running() {
        let (source, controller) = fixtures();
        let supervisor = Supervisor::new(source, controller.clone(), Telemetry::new());
        supervisor.start(spec("api")).await;
        supervisor.start(spec("worker")).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(supervisor.stop("default/api").await);
        assert!(!supervisor.stop("default/api").await);
        assert!(!supervisor.is_running("default/api").await);
        assert!(supervisor.is_running("default/worker").await);
        assert!(supervisor.telemetry().get("default/api").await.is_none());

        // Only the worker keeps scaling.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(controller.replicas(&Workload::new("default", "api")), Some(3));
        assert_eq!(controller.replicas(&Workload::new("default", "worker")), Some(4));

        supervisor.stop_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_a_workload_replaces_its_loop() {
        let (source, controller) = fixtures();
        let supervisor = Supervisor::new(source, controller, Telemetry::new());
        supervisor.start(spec("api")).await;
        supervisor.start(spec("api")).await;

        assert_eq!(supervisor.active().await, vec!["default/api"]);
        supervisor.stop_all().await;
    }

    /// Replica reads take a second; tracks how many overlap.
    #[derive(Default)]
    struct SlowController {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl WorkloadController for SlowController {
        fn current_replicas<'a>(
            &'a self,
            _workload: &'a Workload,
        ) -> BoxFuture<'a, ControllerResult<u32>> {
            Box::pin(async move {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(1)).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(3)
            })
        }

        fn set_replicas<'a>(
            &'a self,
            _workload: &'a Workload,
            _replicas: u32,
        ) -> BoxFuture<'a, ControllerResult<()>> {
            Box::pin(async move { Ok(()) })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn restart_waits_for_the_old_loop_before_spawning() {
        let (source, _) = fixtures();
        let controller = Arc::new(SlowController::default());
        let supervisor = Supervisor::new(source, controller.clone(), Telemetry::new());

        supervisor.start(spec("api")).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        supervisor.start(spec("api")).await;
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(controller.peak.load(Ordering::SeqCst), 1);
        let status = supervisor.telemetry().get("default/api").await.unwrap();
        assert_eq!(status.cycles, 2);

        supervisor.stop_all().await;
    }
}
