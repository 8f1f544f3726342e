//! The threshold scaling policy.
//!
//! Pure and deterministic: no I/O, no clock, no state carried between
//! calls.

use tidescale_core::{Action, ScalingParams};

/// Decide what to do with a workload running `current` replicas at the
/// given CPU and memory utilization.
///
/// Scale-up fires when either metric is strictly above its threshold;
/// scale-down only when both are strictly below. Targets move by at most
/// `params.step` and are clamped to `[min_replicas, max_replicas]`. A
/// clamped target equal to `current` is reported as `Hold`.
///
/// The bounds only hold when `current` is already within
/// `[min_replicas, max_replicas]`. A count outside them moves by `step`
/// toward the range, so a single decision can still target a value
/// outside it: 15 replicas with `max_replicas = 10` and idle load give
/// `ScaleDown(14)`.
pub fn decide(current: u32, cpu: f64, memory: f64, params: &ScalingParams) -> Action {
    let over = cpu > params.cpu_threshold || memory > params.memory_threshold;
    let under = cpu < params.cpu_threshold && memory < params.memory_threshold;

    if over && current < params.max_replicas {
        let target = current
            .saturating_add(params.step)
            .min(params.max_replicas);
        if target != current {
            return Action::ScaleUp(target);
        }
    } else if under && current > params.min_replicas {
        let target = current
            .saturating_sub(params.step)
            .max(params.min_replicas);
        if target != current {
            return Action::ScaleDown(target);
        }
    }

    Action::Hold
}
