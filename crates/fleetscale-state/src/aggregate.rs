//! Resource aggregation over a [`ClusterSnapshot`].
//!
//! Turns per-node and per-allocation records into datacenter totals:
//!
//! ```text
//! demand      = Σ resources of counted allocations on nodes in the datacenter
//! supply      = Σ total resources of eligible nodes
//! utilization = demand / supply        (per resource, 0.0 when supply is 0)
//! blocked     = Σ per-group requirement × queued count over blocked evals
//! ```

use tracing::debug;

use crate::snapshot::ClusterSnapshot;
use crate::types::*;

/// Per-resource utilization ratios. May exceed 1.0 when over-committed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Utilization {
    pub cpu: f64,
    pub memory: f64,
}

impl Utilization {
    /// Compute `demand / supply` for each resource.
    ///
    /// A resource with zero supply (no eligible nodes) reports 0.0. Callers
    /// that act on low utilization must check [`has_supply`] first so an
    /// empty fleet is never treated as an idle one.
    pub fn of(demand: ResourceQuantity, supply: ResourceQuantity) -> Self {
        Self {
            cpu: ratio(demand.cpu, supply.cpu),
            memory: ratio(demand.memory_mb, supply.memory_mb),
        }
    }

    pub fn get(&self, kind: ResourceKind) -> f64 {
        match kind {
            ResourceKind::Cpu => self.cpu,
            ResourceKind::Memory => self.memory,
        }
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// True when both resources have non-zero supply.
pub fn has_supply(supply: ResourceQuantity) -> bool {
    supply.cpu > 0 && supply.memory_mb > 0
}

/// Total demand of counted allocations in `datacenter`, optionally
/// restricted to a single node.
pub fn total_demand(
    snapshot: &ClusterSnapshot,
    datacenter: &str,
    node: Option<&str>,
) -> ResourceQuantity {
    snapshot
        .counted_allocations(datacenter)
        .filter(|a| node.is_none_or(|id| a.node_id == id))
        .map(|a| a.resources)
        .sum()
}

/// Total capacity of the eligible nodes in `datacenter`.
pub fn total_supply(snapshot: &ClusterSnapshot, datacenter: &str) -> ResourceQuantity {
    snapshot
        .eligible_nodes(datacenter)
        .map(|n| n.total_resources)
        .sum()
}

/// Demand the scheduler could not place in `datacenter`.
///
/// Walks blocked evaluations. Each failed task group that lists
/// `datacenter` among its candidate datacenters and reports exhausted
/// resources contributes `requirement × queued`, where the requirement is
/// the group's declared per-instance resources (falling back to the sum of
/// its exhausted tasks when the job definition is unknown) and `queued`
/// comes from the job summary (1 when the summary has no entry).
pub fn blocked_demand(snapshot: &ClusterSnapshot, datacenter: &str) -> BlockedDemand {
    let mut blocked = BlockedDemand::default();

    for eval in snapshot.evaluations() {
        if eval.status != EvaluationStatus::Blocked {
            continue;
        }

        for (group, failed) in &eval.failed_task_groups {
            if !failed.datacenters.iter().any(|dc| dc == datacenter) {
                debug!(
                    job = %eval.job_id,
                    group = %group,
                    "excluding blocked group outside target datacenter"
                );
                continue;
            }
            if failed.exhausted.is_empty() {
                continue;
            }

            let requirement = snapshot
                .job_spec(&eval.job_id)
                .and_then(|spec| spec.task_group(group))
                .map(|g| g.per_instance)
                .unwrap_or_else(|| failed.exhausted_total());

            let queued = snapshot
                .job(&eval.job_id)
                .and_then(|job| job.queued.get(group).copied())
                .unwrap_or(1);

            blocked.max_cpu = blocked.max_cpu.max(requirement.cpu);
            blocked.max_memory_mb = blocked.max_memory_mb.max(requirement.memory_mb);
            blocked.total_cpu += requirement.cpu * u64::from(queued);
            blocked.total_memory_mb += requirement.memory_mb * u64::from(queued);

            debug!(
                job = %eval.job_id,
                group = %group,
                cpu = requirement.cpu,
                memory_mb = requirement.memory_mb,
                queued,
                "blocked task group"
            );
        }
    }

    blocked
}
