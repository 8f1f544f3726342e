//! Loop telemetry — per-workload gauges and counters.
//!
//! Each control loop gets its own `WorkloadTelemetry` handle and writes
//! to it with atomics only; the registry lock is taken just to register
//! or list workloads.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use tidescale_core::{Action, MetricKind, UtilizationSample, Workload, WorkloadId};

const UNKNOWN: i64 = -1;

/// Live counters for one workload's loop.
#[derive(Debug)]
pub struct WorkloadTelemetry {
    workload: Workload,
    /// f64 bits of the last CPU reading.
    cpu: AtomicU64,
    /// f64 bits of the last memory reading.
    memory: AtomicU64,
    cpu_degraded: AtomicBool,
    memory_degraded: AtomicBool,
    /// Last observed replica count, `-1` until the first successful read.
    current_replicas: AtomicI64,
    last_action: Mutex<Option<Action>>,
    /// Unix seconds of the last completed cycle, `0` before the first.
    last_cycle_at: AtomicU64,
    cycles: AtomicU64,
    scale_ups: AtomicU64,
    scale_downs: AtomicU64,
    holds: AtomicU64,
    degraded_cpu_reads: AtomicU64,
    degraded_memory_reads: AtomicU64,
    lookup_failures: AtomicU64,
    scale_failures: AtomicU64,
}

impl WorkloadTelemetry {
    pub fn new(workload: Workload) -> Self {
        Self {
            workload,
            cpu: AtomicU64::new(0f64.to_bits()),
            memory: AtomicU64::new(0f64.to_bits()),
            cpu_degraded: AtomicBool::new(false),
            memory_degraded: AtomicBool::new(false),
            current_replicas: AtomicI64::new(UNKNOWN),
            last_action: Mutex::new(None),
            last_cycle_at: AtomicU64::new(0),
            cycles: AtomicU64::new(0),
            scale_ups: AtomicU64::new(0),
            scale_downs: AtomicU64::new(0),
            holds: AtomicU64::new(0),
            degraded_cpu_reads: AtomicU64::new(0),
            degraded_memory_reads: AtomicU64::new(0),
            lookup_failures: AtomicU64::new(0),
            scale_failures: AtomicU64::new(0),
        }
    }

    pub fn workload(&self) -> &Workload {
        &self.workload
    }

    pub fn record_sample(&self, sample: &UtilizationSample) {
        let (value, degraded, counter) = match sample.kind {
            MetricKind::Cpu => (&self.cpu, &self.cpu_degraded, &self.degraded_cpu_reads),
            MetricKind::Memory => (
                &self.memory,
                &self.memory_degraded,
                &self.degraded_memory_reads,
            ),
        };
        value.store(sample.value.to_bits(), Ordering::Relaxed);
        degraded.store(sample.degraded, Ordering::Relaxed);
        if sample.degraded {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_replicas(&self, replicas: u32) {
        self.current_replicas
            .store(i64::from(replicas), Ordering::Relaxed);
    }

    pub fn record_decision(&self, action: Action) {
        let counter = match action {
            Action::ScaleUp(_) => &self.scale_ups,
            Action::ScaleDown(_) => &self.scale_downs,
            Action::Hold => &self.holds,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        *self.last_action.lock().unwrap_or_else(|e| e.into_inner()) = Some(action);
    }

    pub fn record_lookup_failure(&self) {
        self.lookup_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scale_failure(&self) {
        self.scale_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Mark a cycle as finished at `now` (Unix seconds).
    pub fn record_cycle(&self, now: u64) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.last_cycle_at.store(now, Ordering::Relaxed);
    }

    /// Point-in-time copy of every gauge and counter.
    pub fn status(&self) -> WorkloadStatus {
        let replicas = self.current_replicas.load(Ordering::Relaxed);
        let last_cycle_at = self.last_cycle_at.load(Ordering::Relaxed);
        WorkloadStatus {
            workload: self.workload.id(),
            namespace: self.workload.namespace.clone(),
            name: self.workload.name.clone(),
            cpu: f64::from_bits(self.cpu.load(Ordering::Relaxed)),
            memory: f64::from_bits(self.memory.load(Ordering::Relaxed)),
            cpu_degraded: self.cpu_degraded.load(Ordering::Relaxed),
            memory_degraded: self.memory_degraded.load(Ordering::Relaxed),
            current_replicas: u32::try_from(replicas).ok(),
            last_action: *self.last_action.lock().unwrap_or_else(|e| e.into_inner()),
            last_cycle_at: (last_cycle_at > 0).then_some(last_cycle_at),
            cycles: self.cycles.load(Ordering::Relaxed),
            scale_ups: self.scale_ups.load(Ordering::Relaxed),
            scale_downs: self.scale_downs.load(Ordering::Relaxed),
            holds: self.holds.load(Ordering::Relaxed),
            degraded_cpu_reads: self.degraded_cpu_reads.load(Ordering::Relaxed),
            degraded_memory_reads: self.degraded_memory_reads.load(Ordering::Relaxed),
            lookup_failures: self.lookup_failures.load(Ordering::Relaxed),
            scale_failures: self.scale_failures.load(Ordering::Relaxed),
        }
    }
}

/// Serializable snapshot of a workload's telemetry.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WorkloadStatus {
    pub workload: WorkloadId,
    pub namespace: String,
    pub name: String,
    pub cpu: f64,
    pub memory: f64,
    pub cpu_degraded: bool,
    pub memory_degraded: bool,
    pub current_replicas: Option<u32>,
    pub last_action: Option<Action>,
    pub last_cycle_at: Option<u64>,
    pub cycles: u64,
    pub scale_ups: u64,
    pub scale_downs: u64,
    pub holds: u64,
    pub degraded_cpu_reads: u64,
    pub degraded_memory_reads: u64,
    pub lookup_failures: u64,
    pub scale_failures: u64,
}

/// Registry of per-workload telemetry, shared between the loops and the
/// API server.
#[derive(Debug, Clone, Default)]
pub struct Telemetry {
    workloads: Arc<RwLock<HashMap<WorkloadId, Arc<WorkloadTelemetry>>>>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the telemetry handle for `workload`.
    pub async fn register(&self, workload: &Workload) -> Arc<WorkloadTelemetry> {
        let mut workloads = self.workloads.write().await;
        let entry = workloads
            .entry(workload.id())
            .or_insert_with(|| Arc::new(WorkloadTelemetry::new(workload.clone())));
        debug!(%workload, "registered for telemetry");
        entry.clone()
    }

    pub async fn unregister(&self, workload_id: &str) {
        let mut workloads = self.workloads.write().await;
        if workloads.remove(workload_id).is_some() {
            debug!(workload = %workload_id, "unregistered from telemetry");
        }
    }

    pub async fn get(&self, workload_id: &str) -> Option<WorkloadStatus> {
        let workloads = self.workloads.read().await;
        workloads.get(workload_id).map(|t| t.status())
    }

    /// Status of every registered workload, ordered by id.
    pub async fn statuses(&self) -> Vec<WorkloadStatus> {
        let workloads = self.workloads.read().await;
        let mut out: Vec<WorkloadStatus> = workloads.values().map(|t| t.status()).collect();
        out.sort_by(|a, b| a.workload.cmp(&b.workload));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api() -> Workload {
        Workload::new("default", "api")
    }

    #[test]
    fn fresh_status_has_no_observations() {
        let t = WorkloadTelemetry::new(api());
        let s = t.status();
        assert_eq!(s.workload, "default/api");
        assert_eq!(s.current_replicas, None);
        assert_eq!(s.last_action, None);
        assert_eq!(s.last_cycle_at, None);
        assert_eq!(s.cycles, 0);
    }

    #[test]
    fn samples_update_gauges_and_degraded_counters() {
        let t = WorkloadTelemetry::new(api());
        t.record_sample(&UtilizationSample::new(MetricKind::Cpu, &api(), 0.8, 10));
        t.record_sample(&UtilizationSample::sentinel(MetricKind::Memory, &api(), 10));
        t.record_sample(&UtilizationSample::sentinel(MetricKind::Memory, &api(), 20));

        let s = t.status();
        assert_eq!(s.cpu, 0.8);
        assert!(!s.cpu_degraded);
        assert_eq!(s.memory, 0.0);
        assert!(s.memory_degraded);
        assert_eq!(s.degraded_cpu_reads, 0);
        assert_eq!(s.degraded_memory_reads, 2);
    }

    #[test]
    fn decisions_are_counted_by_kind() {
        let t = WorkloadTelemetry::new(api());
        t.record_decision(Action::ScaleUp(4));
        t.record_decision(Action::Hold);
        t.record_decision(Action::ScaleDown(3));
        t.record_decision(Action::Hold);

        let s = t.status();
        assert_eq!((s.scale_ups, s.scale_downs, s.holds), (1, 1, 2));
        assert_eq!(s.last_action, Some(Action::Hold));
    }

    #[test]
    fn failures_and_cycles() {
        let t = WorkloadTelemetry::new(api());
        t.record_replicas(3);
        t.record_lookup_failure();
        t.record_scale_failure();
        t.record_scale_failure();
        t.record_cycle(1234);

        let s = t.status();
        assert_eq!(s.current_replicas, Some(3));
        assert_eq!(s.lookup_failures, 1);
        assert_eq!(s.scale_failures, 2);
        assert_eq!(s.cycles, 1);
        assert_eq!(s.last_cycle_at, Some(1234));
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let telemetry = Telemetry::new();
        let a = telemetry.register(&api()).await;
        let b = telemetry.register(&api()).await;
        assert!(Arc::ptr_eq(&a, &b));

        a.record_replicas(2);
        assert_eq!(
            telemetry.get("default/api").await.unwrap().current_replicas,
            Some(2)
        );
    }

    #[tokio::test]
    async fn statuses_are_sorted_and_unregister_removes() {
        let telemetry = Telemetry::new();
        telemetry.register(&Workload::new("shop", "web")).await;
        telemetry.register(&Workload::new("default", "worker")).await;

        let ids: Vec<_> = telemetry
            .statuses()
            .await
            .into_iter()
            .map(|s| s.workload)
            .collect();
        assert_eq!(ids, vec!["default/worker", "shop/web"]);

        telemetry.unregister("shop/web").await;
        assert!(telemetry.get("shop/web").await.is_none());
        assert_eq!(telemetry.statuses().await.len(), 1);
    }
}
