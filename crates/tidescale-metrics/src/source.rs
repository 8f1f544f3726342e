//! The read-only utilization collaborator.

use std::collections::HashMap;
use std::sync::RwLock;

use tidescale_core::{
    BoxFuture, MetricKind, SharedClock, UtilizationSample, Workload, WorkloadId, system_clock,
};

/// Supplies the latest utilization of a workload.
///
/// Implementations never fail: when the backend cannot be read they
/// return [`UtilizationSample::sentinel`], and the caller decides how
/// loudly to report it.
pub trait MetricsSource: Send + Sync {
    fn sample<'a>(
        &'a self,
        kind: MetricKind,
        workload: &'a Workload,
    ) -> BoxFuture<'a, UtilizationSample>;
}

/// In-memory source with values set by hand.
///
/// Unset (workload, metric) pairs read as degraded sentinels.
#[derive(Debug)]
pub struct StaticSource {
    values: RwLock<HashMap<(WorkloadId, MetricKind), f64>>,
    clock: SharedClock,
}

impl Default for StaticSource {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticSource {
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Set the value reported for `kind` on `workload`.
    pub fn set(&self, workload: &Workload, kind: MetricKind, value: f64) {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert((workload.id(), kind), value);
    }

    /// Forget the value so subsequent reads degrade.
    pub fn clear(&self, workload: &Workload, kind: MetricKind) {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.remove(&(workload.id(), kind));
    }

    fn lookup(&self, kind: MetricKind, workload: &Workload) -> UtilizationSample {
        let now = self.clock.now_secs();
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        match values.get(&(workload.id(), kind)) {
            Some(v) => UtilizationSample::new(kind, workload, *v, now),
            None => UtilizationSample::sentinel(kind, workload, now),
        }
    }
}

impl MetricsSource for StaticSource {
    fn sample<'a>(
        &'a self,
        kind: MetricKind,
        workload: &'a Workload,
    ) -> BoxFuture<'a, UtilizationSample> {
        let sample = self.lookup(kind, workload);
        Box::pin(async move { sample })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tidescale_core::ManualClock;

    #[tokio::test]
    async fn returns_set_values() {
        let source = StaticSource::with_clock(Arc::new(ManualClock::new(500)));
        let w = Workload::new("default", "api");
        source.set(&w, MetricKind::Cpu, 0.42);

        let s = source.sample(MetricKind::Cpu, &w).await;
        assert_eq!(s.value, 0.42);
        assert_eq!(s.timestamp, 500);
        assert!(!s.degraded);
    }

    #[tokio::test]
    async fn unset_metric_is_sentinel() {
        let source = StaticSource::new();
        let w = Workload::new("default", "api");
        source.set(&w, MetricKind::Cpu, 0.9);

        let s = source.sample(MetricKind::Memory, &w).await;
        assert_eq!(s.value, 0.0);
        assert!(s.degraded);
    }

    #[tokio::test]
    async fn clear_degrades_reads() {
        let source = StaticSource::new();
        let w = Workload::new("default", "api");
        source.set(&w, MetricKind::Cpu, 0.9);
        source.clear(&w, MetricKind::Cpu);

        assert!(source.sample(MetricKind::Cpu, &w).await.degraded);
    }

    #[tokio::test]
    async fn workloads_are_isolated() {
        let source = StaticSource::new();
        let a = Workload::new("default", "a");
        let b = Workload::new("default", "b");
        source.set(&a, MetricKind::Cpu, 0.8);

        assert_eq!(source.sample(MetricKind::Cpu, &a).await.value, 0.8);
        assert!(source.sample(MetricKind::Cpu, &b).await.degraded);
    }
}
