//! Control loop — one per workload.
//!
//! Samples CPU and memory from the `MetricsSource`, reads the desired
//! replica count from the `WorkloadController`, applies the policy, and
//! writes a new count when it changes. Every collaborator call is bounded
//! by a timeout. Failures are logged and counted, never returned.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use tidescale_controller::WorkloadController;
use tidescale_core::config::DEFAULT_CALL_TIMEOUT;
use tidescale_core::{
    Action, MetricKind, ScalingParams, SharedClock, UtilizationSample, Workload, WorkloadSpec,
    system_clock,
};
use tidescale_metrics::{MetricsSource, WorkloadTelemetry};

use crate::policy::decide;

/// Lifecycle of a control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Polling,
    Stopped,
}

/// What a single cycle ended up doing.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The replica count could not be read; the policy was not evaluated.
    LookupFailed,
    /// The policy decided not to change anything.
    Held { replicas: u32 },
    /// A new replica count was written.
    Scaled { from: u32, action: Action },
    /// The policy fired but the write failed.
    ScaleFailed { from: u32, action: Action },
}

/// Inputs and result of one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub cpu: UtilizationSample,
    pub memory: UtilizationSample,
    pub outcome: CycleOutcome,
}

/// Sample → decide → act → sleep, until shut down.
pub struct ControlLoop {
    workload: Workload,
    params: ScalingParams,
    source: Arc<dyn MetricsSource>,
    controller: Arc<dyn WorkloadController>,
    telemetry: Arc<WorkloadTelemetry>,
    metric_timeout: Duration,
    controller_timeout: Duration,
    clock: SharedClock,
    state: LoopState,
}

impl ControlLoop {
    pub fn new(
        spec: WorkloadSpec,
        source: Arc<dyn MetricsSource>,
        controller: Arc<dyn WorkloadController>,
    ) -> Self {
        let telemetry = Arc::new(WorkloadTelemetry::new(spec.workload.clone()));
        Self {
            workload: spec.workload,
            params: spec.params,
            source,
            controller,
            telemetry,
            metric_timeout: DEFAULT_CALL_TIMEOUT,
            controller_timeout: DEFAULT_CALL_TIMEOUT,
            clock: system_clock(),
            state: LoopState::Polling,
        }
    }

    /// Report into a shared telemetry handle instead of a private one.
    pub fn with_telemetry(mut self, telemetry: Arc<WorkloadTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Bound metric reads and controller calls separately.
    pub fn with_timeouts(mut self, metric: Duration, controller: Duration) -> Self {
        self.metric_timeout = metric;
        self.controller_timeout = controller;
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn workload(&self) -> &Workload {
        &self.workload
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn telemetry(&self) -> &Arc<WorkloadTelemetry> {
        &self.telemetry
    }

    /// Read one metric, substituting the sentinel on timeout. Degraded
    /// reads are logged here.
    async fn read_metric(&self, kind: MetricKind) -> UtilizationSample {
        let read = self.source.sample(kind, &self.workload);
        let sample = match tokio::time::timeout(self.metric_timeout, read).await {
            Ok(sample) => sample,
            Err(_) => {
                UtilizationSample::sentinel(kind, &self.workload, self.clock.now_secs())
            }
        };

        if sample.degraded {
            warn!(
                workload = %self.workload,
                metric = %kind,
                "metric unavailable, treating as idle"
            );
        }
        self.telemetry.record_sample(&sample);
        sample
    }

    async fn read_replicas(&self) -> Option<u32> {
        let read = self.controller.current_replicas(&self.workload);
        match tokio::time::timeout(self.controller_timeout, read).await {
            Ok(Ok(replicas)) => {
                self.telemetry.record_replicas(replicas);
                Some(replicas)
            }
            Ok(Err(e)) => {
                error!(workload = %self.workload, error = %e, "replica lookup failed, skipping cycle");
                self.telemetry.record_lookup_failure();
                None
            }
            Err(_) => {
                error!(
                    workload = %self.workload,
                    timeout_ms = self.controller_timeout.as_millis() as u64,
                    "replica lookup timed out, skipping cycle"
                );
                self.telemetry.record_lookup_failure();
                None
            }
        }
    }

    /// Run a single sample → decide → act pass.
    pub async fn run_cycle(&self) -> CycleReport {
        // Independent reads: one failing metric does not hold up the other.
        let (cpu, memory) = tokio::join!(
            self.read_metric(MetricKind::Cpu),
            self.read_metric(MetricKind::Memory)
        );

        let outcome = match self.read_replicas().await {
            None => CycleOutcome::LookupFailed,
            Some(current) => self.act(current, cpu.value, memory.value).await,
        };

        self.telemetry.record_cycle(self.clock.now_secs());
        CycleReport {
            cpu,
            memory,
            outcome,
        }
    }

    async fn act(&self, current: u32, cpu: f64, memory: f64) -> CycleOutcome {
        let action = decide(current, cpu, memory, &self.params);
        self.telemetry.record_decision(action);

        let Some(target) = action.target() else {
            debug!(
                workload = %self.workload,
                replicas = current,
                cpu,
                memory,
                "holding"
            );
            return CycleOutcome::Held { replicas: current };
        };

        let write = self.controller.set_replicas(&self.workload, target);
        let failure = match tokio::time::timeout(self.controller_timeout, write).await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!(
                "timed out after {}ms",
                self.controller_timeout.as_millis()
            )),
        };

        match failure {
            None => {
                self.telemetry.record_replicas(target);
                info!(
                    workload = %self.workload,
                    from = current,
                    to = target,
                    cpu,
                    memory,
                    action = action.label(),
                    "scaled"
                );
                CycleOutcome::Scaled {
                    from: current,
                    action,
                }
            }
            Some(reason) => {
                self.telemetry.record_scale_failure();
                error!(
                    workload = %self.workload,
                    from = current,
                    to = target,
                    error = %reason,
                    "scale command failed"
                );
                CycleOutcome::ScaleFailed {
                    from: current,
                    action,
                }
            }
        }
    }

    /// Run the loop until `shutdown` changes or its sender is dropped.
    ///
    /// The first cycle runs immediately; the sleep between cycles is the
    /// only place the loop waits and is cut short by shutdown.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        if self.state == LoopState::Stopped || *shutdown.borrow() {
            self.state = LoopState::Stopped;
            return;
        }

        info!(
            workload = %self.workload,
            interval_secs = self.params.poll_interval.as_secs(),
            min = self.params.min_replicas,
            max = self.params.max_replicas,
            "control loop started"
        );

        loop {
            self.run_cycle().await;

            tokio::select! {
                _ = tokio::time::sleep(self.params.poll_interval) => {}
                _ = shutdown.changed() => {
                    info!(workload = %self.workload, "control loop shutting down");
                    break;
                }
            }
        }

        self.state = LoopState::Stopped;
    }
}
