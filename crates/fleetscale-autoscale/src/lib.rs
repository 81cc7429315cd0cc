//! fleetscale-autoscale: demand-driven fleet scaling.
//!
//! Captures a cluster snapshot, decides whether the datacenter needs more
//! or fewer machines, and applies the decision to the fleet.
//!
//! # Scaling Algorithm
//!
//! ```text
//! if blocked_demand > 0:
//!     units     = expand(blocked, cpu_shares_per_core)
//!     instances = cheapest_combination(catalog, units)
//!     ScaleUp(ProvisionGroup per instance)
//!
//! elif util.cpu < down_cpu and util.mem < down_mem:
//!     resource  = argmin(threshold - util)
//!     removable = supply - demand * ((1 - median) + 1)
//!     ScaleDown(RemoveNode per ranked, drainable node, ≤ step)
//! ```
//!
//! The loop waits `scale_up_cooldown` (300s) after acting and
//! `idle_interval` (60s) otherwise, refreshing stale managed groups
//! between idle iterations.

pub mod actuator;
pub mod config;
pub mod engine;
pub mod error;
pub mod intent;
pub mod naming;
pub mod scaler;

pub use actuator::{ActuationReport, Actuator};
pub use config::{DEFAULT_CPU_SHARES_PER_CORE, ScalingPolicy};
pub use engine::{DecisionEngine, constrained_resource, expand_blocked_demand, select_removals};
pub use error::{ScaleError, ScaleResult};
pub use intent::{Decision, ScalingIntent};
pub use naming::{DEFAULT_GROUP_PREFIX, GroupNamer, RandomGroupNames, SequentialGroupNames};
pub use scaler::{Autoscaler, IterationOutcome};
