//! tidescale-autoscale — threshold-driven replica scaling.
//!
//! Each monitored workload runs its own `ControlLoop`: sample CPU and
//! memory, read the current desired replica count, evaluate the policy,
//! write the new count if it changed, sleep, repeat. Loops share no
//! mutable state and stop when their shutdown channel fires.
//!
//! # Scaling Policy
//!
//! ```text
//! if (cpu > cpu_threshold or memory > memory_threshold) and current < max:
//!     ScaleUp(min(current + step, max))
//! elif cpu < cpu_threshold and memory < memory_threshold and current > min:
//!     ScaleDown(max(current - step, min))
//! else:
//!     Hold
//! ```
//!
//! A reading exactly at a threshold triggers neither rule. Unreadable
//! metrics arrive as `0.0` and so can only ever scale down.

pub mod policy;
pub mod scaler;
pub mod supervisor;

pub use policy::decide;
pub use scaler::{ControlLoop, CycleOutcome, CycleReport, LoopState};
pub use supervisor::Supervisor;
