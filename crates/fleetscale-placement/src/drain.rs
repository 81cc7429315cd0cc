//! Drain feasibility.
//!
//! A node may be removed only if everything it currently runs fits into
//! the spare capacity of the other eligible nodes. No new machines are
//! considered here; only existing headroom counts.

use std::collections::HashMap;

use fleetscale_state::{ClusterSnapshot, NodeId, ResourceQuantity};
use tracing::debug;

use crate::convert::{capacity_after, workloads_by_node};

/// One allocation's footprint on the candidate node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadUnit {
    pub job_id: String,
    pub cpu: u64,
    pub memory_mb: u64,
}

/// Spare capacity of a node that could absorb relocated work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeCapacity {
    pub node_id: String,
    pub available_cpu: i64,
    pub available_memory_mb: i64,
}

impl NodeCapacity {
    fn try_take(&mut self, unit: &WorkloadUnit) -> bool {
        let cpu = i64::try_from(unit.cpu).unwrap_or(i64::MAX);
        let mem = i64::try_from(unit.memory_mb).unwrap_or(i64::MAX);
        if self.available_cpu >= cpu && self.available_memory_mb >= mem {
            self.available_cpu -= cpu;
            self.available_memory_mb -= mem;
            true
        } else {
            false
        }
    }
}

/// First-fit every unit, in the given order, into the first node with
/// enough CPU and memory. Returns false as soon as one unit fits nowhere.
pub fn can_place_all(units: &[WorkloadUnit], nodes: &mut [NodeCapacity]) -> bool {
    units
        .iter()
        .all(|unit| nodes.iter_mut().any(|node| node.try_take(unit)))
}

/// Workloads and spare capacity of one datacenter, computed once so that
/// many drain checks against the same snapshot stay linear in its size.
#[derive(Debug, Clone)]
pub struct DrainContext {
    workloads: HashMap<NodeId, Vec<WorkloadUnit>>,
    /// Eligible nodes in snapshot order.
    capacities: Vec<NodeCapacity>,
}

impl DrainContext {
    pub fn new(snapshot: &ClusterSnapshot, datacenter: &str) -> Self {
        let workloads = workloads_by_node(snapshot, datacenter);
        let capacities = snapshot
            .eligible_nodes(datacenter)
            .map(|node| {
                let used = workloads
                    .get(&node.id)
                    .map(|units| {
                        units
                            .iter()
                            .map(|u| ResourceQuantity::new(u.cpu, u.memory_mb))
                            .sum::<ResourceQuantity>()
                    })
                    .unwrap_or(ResourceQuantity::ZERO);
                capacity_after(node, used)
            })
            .collect();
        Self { workloads, capacities }
    }

    /// Counted workload of `node_id`, empty when it runs nothing.
    pub fn workload(&self, node_id: &str) -> &[WorkloadUnit] {
        self.workloads.get(node_id).map_or(&[][..], Vec::as_slice)
    }

    /// Whether `node_id`'s workload can be re-hosted on the rest of the fleet.
    pub fn can_drain(&self, node_id: &str) -> bool {
        let units = self.workload(node_id);
        let mut others: Vec<NodeCapacity> = self
            .capacities
            .iter()
            .filter(|c| c.node_id != node_id)
            .cloned()
            .collect();

        let feasible = can_place_all(units, &mut others);
        if !feasible {
            debug!(node = %node_id, allocations = units.len(), "node cannot be drained");
        }
        feasible
    }
}

/// One-off drain check. Callers checking several nodes of the same
/// snapshot should build a [`DrainContext`] once instead.
pub fn can_drain(snapshot: &ClusterSnapshot, datacenter: &str, node_id: &str) -> bool {
    DrainContext::new(snapshot, datacenter).can_drain(node_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetscale_state::*;

    fn unit(cpu: u64, mem: u64) -> WorkloadUnit {
        WorkloadUnit {
            job_id: "j".to_string(),
            cpu,
            memory_mb: mem,
        }
    }

    fn cap(id: &str, cpu: i64, mem: i64) -> NodeCapacity {
        NodeCapacity {
            node_id: id.to_string(),
            available_cpu: cpu,
            available_memory_mb: mem,
        }
    }

    fn make_node(id: &str, cpu: u64, mem: u64) -> Node {
        Node {
            id: id.to_string(),
            datacenter: "dc1".to_string(),
            eligible: true,
            ready: true,
            total_resources: ResourceQuantity::new(cpu, mem),
            reserved_resources: ResourceQuantity::ZERO,
        }
    }

    fn make_alloc(id: &str, node: &str, cpu: u64, mem: u64) -> Allocation {
        Allocation {
            id: id.to_string(),
            node_id: node.to_string(),
            job_id: id.to_string(),
            resources: ResourceQuantity::new(cpu, mem),
            lifecycle: AllocationStatus::Running,
            desired: DesiredStatus::Run,
        }
    }

    #[test]
    fn first_fit_decrements_capacity() {
        let mut nodes = vec![cap("n1", 1000, 1000), cap("n2", 1000, 1000)];
        assert!(can_place_all(&[unit(600, 600), unit(600, 600)], &mut nodes));
        assert_eq!(nodes[0].available_cpu, 400);
        assert_eq!(nodes[1].available_cpu, 400);
    }

    #[test]
    fn unit_order_is_not_sorted() {
        // Placing the small unit first wastes n1; the large one then fits nowhere.
        let mut nodes = vec![cap("n1", 1000, 1000), cap("n2", 500, 500)];
        assert!(!can_place_all(&[unit(600, 600), unit(1000, 1000)], &mut nodes));

        let mut nodes = vec![cap("n1", 1000, 1000), cap("n2", 600, 600)];
        assert!(can_place_all(&[unit(1000, 1000), unit(600, 600)], &mut nodes));
    }

    #[test]
    fn both_resources_must_fit() {
        let mut nodes = vec![cap("n1", 5000, 100)];
        assert!(!can_place_all(&[unit(10, 200)], &mut nodes));
    }

    #[test]
    fn empty_workload_is_always_drainable() {
        assert!(can_place_all(&[], &mut []));
    }

    #[test]
    fn drain_against_snapshot() {
        let snap = ClusterSnapshot::new(
            vec![make_node("n1", 2000, 2000), make_node("n2", 2000, 2000)],
            vec![
                make_alloc("a1", "n1", 500, 500),
                make_alloc("a2", "n2", 1000, 1000),
            ],
            vec![],
            vec![],
        );
        // n1's 500 fits into n2's 1000 spare.
        assert!(can_drain(&snap, "dc1", "n1"));
        // n2's 1000 fits into n1's 1500 spare.
        assert!(can_drain(&snap, "dc1", "n2"));
    }

    #[test]
    fn single_node_with_work_cannot_drain() {
        let snap = ClusterSnapshot::new(
            vec![make_node("n1", 2000, 2000)],
            vec![make_alloc("a1", "n1", 1, 1)],
            vec![],
            vec![],
        );
        assert!(!can_drain(&snap, "dc1", "n1"));
    }

    #[test]
    fn reserved_resources_are_not_spare() {
        let mut n2 = make_node("n2", 2000, 2000);
        n2.reserved_resources = ResourceQuantity::new(1600, 0);
        let snap = ClusterSnapshot::new(
            vec![make_node("n1", 2000, 2000), n2],
            vec![make_alloc("a1", "n1", 500, 500)],
            vec![],
            vec![],
        );
        assert!(!can_drain(&snap, "dc1", "n1"));
    }

    #[test]
    fn context_matches_one_off_checks() {
        let snap = ClusterSnapshot::new(
            vec![
                make_node("n1", 2000, 2000),
                make_node("n2", 2000, 2000),
                make_node("n3", 1000, 1000),
            ],
            vec![
                make_alloc("a1", "n1", 1500, 1500),
                make_alloc("a2", "n2", 400, 400),
                make_alloc("a3", "n3", 900, 900),
                make_alloc("a4", "n2", 300, 300),
            ],
            vec![],
            vec![],
        );
        let ctx = DrainContext::new(&snap, "dc1");
        for id in ["n1", "n2", "n3", "ghost"] {
            assert_eq!(ctx.can_drain(id), can_drain(&snap, "dc1", id), "node {id}");
        }
        assert_eq!(ctx.workload("n2").len(), 2);
        assert!(ctx.workload("ghost").is_empty());
        // n1's 1500 needs one node with that much room; n2 has 1300, n3 has 100.
        assert!(!ctx.can_drain("n1"));
        assert!(ctx.can_drain("n3"));
    }
}
