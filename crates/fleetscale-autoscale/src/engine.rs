//! Decision engine: one control-loop iteration as a pure function.
//!
//! Reads a single [`ClusterSnapshot`] and returns a [`Decision`]. Never
//! touches the fleet and never re-reads cluster state.
//!
//! ```text
//! blocked demand > 0 ──▶ expand into unit jobs ──▶ cheapest combination
//!                                                  └─▶ ScaleUp(ProvisionGroup…)
//! otherwise
//! util.cpu < down_cpu && util.mem < down_mem
//!   resource  = the one closer to its threshold
//!   target    = demand × ((1 − median) + 1)
//!   removable = supply − target
//!   walk ranked nodes, keep those that fit under `removable` and can drain,
//!   stopping after scale_down_step ──▶ ScaleDown(RemoveNode…)
//! ```

use tracing::{debug, info, warn};

use fleetscale_placement::{
    DrainContext, InstanceCatalog, ProvisionJob, cheapest_combination, rank_nodes_for_removal,
};
use fleetscale_state::{
    BlockedDemand, ClusterSnapshot, ResourceKind, Utilization, blocked_demand, has_supply,
    total_demand, total_supply,
};

use crate::config::ScalingPolicy;
use crate::intent::{Decision, ScalingIntent};
use crate::naming::{GroupNamer, RandomGroupNames};

pub struct DecisionEngine {
    policy: ScalingPolicy,
    catalog: InstanceCatalog,
    namer: Box<dyn GroupNamer>,
}

impl DecisionEngine {
    pub fn new(policy: ScalingPolicy, catalog: InstanceCatalog) -> Self {
        Self {
            policy,
            catalog,
            namer: Box::new(RandomGroupNames::default()),
        }
    }

    pub fn with_namer(mut self, namer: impl GroupNamer + 'static) -> Self {
        self.namer = Box::new(namer);
        self
    }

    pub fn policy(&self) -> &ScalingPolicy {
        &self.policy
    }

    /// Decide what to do about `snapshot`.
    ///
    /// Blocked demand always wins: while any work is blocked, no node is
    /// removed, even when none of it can be provisioned.
    pub fn decide(&self, snapshot: &ClusterSnapshot) -> Decision {
        let blocked = blocked_demand(snapshot, &self.policy.datacenter);
        if !blocked.is_empty() {
            info!(
                total_cpu = blocked.total_cpu,
                total_memory_mb = blocked.total_memory_mb,
                max_cpu = blocked.max_cpu,
                max_memory_mb = blocked.max_memory_mb,
                "blocked demand found, scaling up"
            );
            let intents = self.plan_scale_up(&blocked);
            if intents.is_empty() {
                warn!("blocked demand fits no instance type, holding current capacity");
                return Decision::NoChange;
            }
            return Decision::ScaleUp(intents);
        }

        let intents = self.plan_scale_down(snapshot);
        if intents.is_empty() {
            Decision::NoChange
        } else {
            Decision::ScaleDown(intents)
        }
    }

    fn plan_scale_up(&self, blocked: &BlockedDemand) -> Vec<ScalingIntent> {
        let jobs = expand_blocked_demand(blocked, self.policy.cpu_shares_per_core);
        let plan = cheapest_combination(&self.catalog, &jobs);
        info!(
            unit_jobs = jobs.len(),
            instances = plan.allocations.len(),
            total_cost = plan.total_cost,
            unplaceable = plan.unplaceable.len(),
            "cheapest instance combination"
        );

        plan.allocations
            .iter()
            .map(|a| {
                let name = self.namer.next_name();
                debug!(group = %name, instance_type = %a.instance_type, "planned group");
                ScalingIntent::ProvisionGroup {
                    name,
                    instance_type: a.instance_type.clone(),
                }
            })
            .collect()
    }

    fn plan_scale_down(&self, snapshot: &ClusterSnapshot) -> Vec<ScalingIntent> {
        let dc = &self.policy.datacenter;
        let supply = total_supply(snapshot, dc);
        if !has_supply(supply) {
            debug!(datacenter = %dc, "no eligible nodes, skipping scale-down");
            return Vec::new();
        }

        let demand = total_demand(snapshot, dc, None);
        let util = Utilization::of(demand, supply);
        info!(
            cpu_util = util.cpu,
            mem_util = util.memory,
            demand_cpu = demand.cpu,
            demand_memory_mb = demand.memory_mb,
            supply_cpu = supply.cpu,
            supply_memory_mb = supply.memory_mb,
            "datacenter utilization"
        );

        if util.cpu >= self.policy.scale_down_cpu_util
            || util.memory >= self.policy.scale_down_mem_util
        {
            debug!("utilization at or above a scale-down threshold");
            return Vec::new();
        }

        let kind = constrained_resource(&self.policy, util);
        let median = self.policy.median_util(kind);
        let target = demand.get(kind) as f64 * ((1.0 - median) + 1.0);
        let removable = supply.get(kind) as f64 - target;
        info!(
            resource = %kind,
            utilization = util.get(kind),
            supply = supply.get(kind),
            target,
            removable,
            "scaling down along the constrained resource"
        );
        if removable <= 0.0 {
            return Vec::new();
        }

        let chosen = select_removals(snapshot, dc, kind, removable, self.policy.scale_down_step);
        if chosen.len() == self.policy.scale_down_step {
            info!(step = self.policy.scale_down_step, "scale-down step reached");
        }

        chosen
            .into_iter()
            .map(|node_id| ScalingIntent::RemoveNode { node_id })
            .collect()
    }
}

/// The resource whose utilization is closer to its scale-down threshold.
/// Ties go to CPU.
pub fn constrained_resource(policy: &ScalingPolicy, util: Utilization) -> ResourceKind {
    let mem_diff = policy.scale_down_mem_util - util.memory;
    let cpu_diff = policy.scale_down_cpu_util - util.cpu;
    if mem_diff < cpu_diff {
        ResourceKind::Memory
    } else {
        ResourceKind::Cpu
    }
}

/// Expand aggregate blocked demand into identical unit jobs sized at the
/// per-group peak.
///
/// Enough units are produced to cover the aggregate of both resources:
/// `max(⌈total_cpu / max_cpu⌉, ⌈total_mem / max_mem⌉)`. CPU shares are
/// converted to vCPUs with `shares_per_core`.
pub fn expand_blocked_demand(blocked: &BlockedDemand, shares_per_core: u64) -> Vec<ProvisionJob> {
    if blocked.is_empty() {
        return Vec::new();
    }

    let units = units_needed(blocked.total_cpu, blocked.max_cpu)
        .max(units_needed(blocked.total_memory_mb, blocked.max_memory_mb));
    let job = ProvisionJob {
        cpu: blocked.max_cpu as f64 / shares_per_core.max(1) as f64,
        memory_mb: blocked.max_memory_mb,
    };
    vec![job; units as usize]
}

fn units_needed(total: u64, peak: u64) -> u64 {
    if peak == 0 { 0 } else { total.div_ceil(peak) }
}

/// Walk the removal ranking and pick nodes whose capacity of `kind` keeps
/// the running total strictly below `removable` and that can be drained.
///
/// The walk stops once `limit` nodes are accepted, so the result is the
/// first `limit` entries of the unbounded selection.
pub fn select_removals(
    snapshot: &ClusterSnapshot,
    datacenter: &str,
    kind: ResourceKind,
    removable: f64,
    limit: usize,
) -> Vec<String> {
    let mut chosen = Vec::new();
    let mut running = 0.0_f64;
    if limit == 0 {
        return chosen;
    }
    let drain = DrainContext::new(snapshot, datacenter);

    for candidate in rank_nodes_for_removal(snapshot, datacenter) {
        let Some(node) = snapshot.node(&candidate.node_id) else {
            continue;
        };
        let capacity = node.total_resources.get(kind) as f64;

        if running + capacity < removable {
            if drain.can_drain(&node.id) {
                running += capacity;
                debug!(
                    node = %node.id,
                    priority = candidate.highest_job_priority,
                    footprint = candidate.footprint,
                    remaining = removable - running,
                    "node accepted for removal"
                );
                chosen.push(node.id.clone());
            } else {
                debug!(node = %node.id, "node cannot be drained, skipping");
            }
        } else {
            debug!(node = %node.id, capacity, "node would overshoot removable amount");
        }

        if running >= removable || chosen.len() == limit {
            break;
        }
    }

    debug!(candidates = chosen.len(), "scale-down candidates found");
    chosen
}
