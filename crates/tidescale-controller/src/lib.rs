//! tidescale-controller — the replica-count collaborator.
//!
//! A `WorkloadController` owns a workload's desired replica count. The
//! control loop reads it at the start of a cycle and writes a new value
//! when the policy fires; reconciling that value into running instances
//! is the controller's business.
//!
//! Two implementations ship here:
//!
//! - [`KubernetesController`] talks to the `apps/v1` deployment `scale`
//!   subresource over plain HTTP (an API server behind `kubectl proxy`,
//!   or a sidecar that terminates TLS).
//! - [`InMemoryController`] keeps counts in a map, for tests and dry runs.

pub mod error;
pub mod kubernetes;
pub mod memory;

use tidescale_core::{BoxFuture, Workload};

pub use error::{ControllerError, ControllerResult};
pub use kubernetes::KubernetesController;
pub use memory::InMemoryController;

/// Reads and writes a workload's desired replica count.
pub trait WorkloadController: Send + Sync {
    /// Current desired replica count. Fails with
    /// [`ControllerError::Lookup`] if the workload does not exist or the
    /// controller cannot be reached.
    fn current_replicas<'a>(&'a self, workload: &'a Workload) -> BoxFuture<'a, ControllerResult<u32>>;

    /// Request a new desired replica count. Writing the current value
    /// again must leave the workload unchanged.
    fn set_replicas<'a>(
        &'a self,
        workload: &'a Workload,
        replicas: u32,
    ) -> BoxFuture<'a, ControllerResult<()>>;
}
