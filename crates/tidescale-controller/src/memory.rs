//! In-memory controller.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use tidescale_core::{BoxFuture, Workload, WorkloadId};

use crate::WorkloadController;
use crate::error::{ControllerError, ControllerResult};

/// Desired replica counts held in a map. Unknown workloads fail lookup.
#[derive(Debug, Default)]
pub struct InMemoryController {
    replicas: RwLock<HashMap<WorkloadId, u32>>,
    /// Writes that actually changed a count.
    writes: AtomicU64,
}

impl InMemoryController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from `namespace/name → replicas` pairs.
    pub fn from_counts(counts: impl IntoIterator<Item = (WorkloadId, u32)>) -> Self {
        Self {
            replicas: RwLock::new(counts.into_iter().collect()),
            writes: AtomicU64::new(0),
        }
    }

    /// Register or overwrite a workload's count without counting a write.
    pub fn insert(&self, workload: &Workload, replicas: u32) {
        let mut map = self.replicas.write().unwrap_or_else(|e| e.into_inner());
        map.insert(workload.id(), replicas);
    }

    pub fn remove(&self, workload: &Workload) {
        let mut map = self.replicas.write().unwrap_or_else(|e| e.into_inner());
        map.remove(&workload.id());
    }

    pub fn replicas(&self, workload: &Workload) -> Option<u32> {
        let map = self.replicas.read().unwrap_or_else(|e| e.into_inner());
        map.get(&workload.id()).copied()
    }

    /// Number of `set_replicas` calls that changed a count.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    fn read(&self, workload: &Workload) -> ControllerResult<u32> {
        self.replicas(workload)
            .ok_or_else(|| ControllerError::lookup(workload, "workload not registered"))
    }

    fn write(&self, workload: &Workload, replicas: u32) -> ControllerResult<()> {
        let mut map = self.replicas.write().unwrap_or_else(|e| e.into_inner());
        let current = map
            .get_mut(&workload.id())
            .ok_or_else(|| ControllerError::scale_command(workload, "workload not registered"))?;
        if *current != replicas {
            debug!(%workload, from = *current, to = replicas, "replica count updated");
            *current = replicas;
            self.writes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}

impl WorkloadController for InMemoryController {
    fn current_replicas<'a>(&'a self, workload: &'a Workload) -> BoxFuture<'a, ControllerResult<u32>> {
        let result = self.read(workload);
        Box::pin(async move { result })
    }

    fn set_replicas<'a>(
        &'a self,
        workload: &'a Workload,
        replicas: u32,
    ) -> BoxFuture<'a, ControllerResult<()>> {
        let result = self.write(workload, replicas);
        Box::pin(async move { result })
    }
}
