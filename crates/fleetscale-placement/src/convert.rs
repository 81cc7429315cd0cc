//! Conversions from snapshot records to placement inputs.
//!
//! Bridges `fleetscale_state::ClusterSnapshot` to the drain checker's
//! [`WorkloadUnit`] and [`NodeCapacity`] lists.

use std::collections::HashMap;

use fleetscale_state::{ClusterSnapshot, Node, NodeId, ResourceQuantity, total_demand};

use crate::drain::{NodeCapacity, WorkloadUnit};

/// The counted allocations on `node_id`, in snapshot order.
pub fn node_workload(
    snapshot: &ClusterSnapshot,
    datacenter: &str,
    node_id: &str,
) -> Vec<WorkloadUnit> {
    snapshot
        .counted_allocations(datacenter)
        .filter(|a| a.node_id == node_id)
        .map(|a| WorkloadUnit {
            job_id: a.job_id.clone(),
            cpu: a.resources.cpu,
            memory_mb: a.resources.memory_mb,
        })
        .collect()
}

/// Spare capacity of a node: `total - reserved - current demand`.
///
/// Over-committed nodes report negative availability and never accept
/// relocated work.
pub fn node_to_capacity(snapshot: &ClusterSnapshot, datacenter: &str, node: &Node) -> NodeCapacity {
    capacity_after(node, total_demand(snapshot, datacenter, Some(&node.id)))
}

/// Spare capacity of `node` once `used` is subtracted.
pub fn capacity_after(node: &Node, used: ResourceQuantity) -> NodeCapacity {
    NodeCapacity {
        node_id: node.id.clone(),
        available_cpu: signed(node.total_resources.cpu)
            - signed(node.reserved_resources.cpu)
            - signed(used.cpu),
        available_memory_mb: signed(node.total_resources.memory_mb)
            - signed(node.reserved_resources.memory_mb)
            - signed(used.memory_mb),
    }
}

/// Counted workload of every node in `datacenter`, grouped in one pass.
/// Each node's units keep snapshot order.
pub fn workloads_by_node(
    snapshot: &ClusterSnapshot,
    datacenter: &str,
) -> HashMap<NodeId, Vec<WorkloadUnit>> {
    let mut workloads: HashMap<NodeId, Vec<WorkloadUnit>> = HashMap::new();
    for a in snapshot.counted_allocations(datacenter) {
        workloads.entry(a.node_id.clone()).or_default().push(WorkloadUnit {
            job_id: a.job_id.clone(),
            cpu: a.resources.cpu,
            memory_mb: a.resources.memory_mb,
        });
    }
    workloads
}

fn signed(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}
