//! Removal ranking: orders nodes safest-to-remove first.
//!
//! Each eligible node is summarized by the highest scheduling priority of
//! the jobs it hosts and its footprint (CPU shares plus memory MB of its
//! allocations). Nodes sort ascending by priority, then by footprint, so
//! idle nodes and nodes running only small, unimportant work come first.

use std::collections::HashMap;

use fleetscale_state::ClusterSnapshot;
use serde::Serialize;

/// Removal summary for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovalCandidate {
    pub node_id: String,
    /// Highest job priority among the node's allocations, 0 when idle.
    pub highest_job_priority: u32,
    /// Σ cpu + Σ memory_mb of the node's allocations.
    pub footprint: u64,
}

/// Rank the eligible nodes of `datacenter` for removal, best candidate first.
///
/// The sort is stable: nodes that tie on both keys keep snapshot order.
pub fn rank_nodes_for_removal(
    snapshot: &ClusterSnapshot,
    datacenter: &str,
) -> Vec<RemovalCandidate> {
    let mut candidates: Vec<RemovalCandidate> = snapshot
        .eligible_nodes(datacenter)
        .map(|n| RemovalCandidate {
            node_id: n.id.clone(),
            highest_job_priority: 0,
            footprint: 0,
        })
        .collect();

    let index: HashMap<String, usize> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (c.node_id.clone(), i))
        .collect();

    for alloc in snapshot.counted_allocations(datacenter) {
        let Some(&i) = index.get(&alloc.node_id) else {
            continue;
        };
        let candidate = &mut candidates[i];
        candidate.highest_job_priority = candidate
            .highest_job_priority
            .max(snapshot.job_priority(&alloc.job_id));
        candidate.footprint += alloc.resources.cpu + alloc.resources.memory_mb;
    }

    candidates.sort_by(|a, b| {
        a.highest_job_priority
            .cmp(&b.highest_job_priority)
            .then(a.footprint.cmp(&b.footprint))
    });
    candidates
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use fleetscale_state::*;

    fn make_node(id: &str) -> Node {
        Node {
            id: id.to_string(),
            datacenter: "dc1".to_string(),
            eligible: true,
            ready: true,
            total_resources: ResourceQuantity::new(4000, 4000),
            reserved_resources: ResourceQuantity::ZERO,
        }
    }

    fn make_alloc(node: &str, job: &str, cpu: u64, mem: u64) -> Allocation {
        Allocation {
            id: format!("{node}-{job}"),
            node_id: node.to_string(),
            job_id: job.to_string(),
            resources: ResourceQuantity::new(cpu, mem),
            lifecycle: AllocationStatus::Running,
            desired: DesiredStatus::Run,
        }
    }

    fn job(id: &str, priority: u32) -> JobMeta {
        JobMeta {
            id: id.to_string(),
            priority,
            queued: BTreeMap::new(),
        }
    }

    fn order(ranked: &[RemovalCandidate]) -> Vec<&str> {
        ranked.iter().map(|c| c.node_id.as_str()).collect()
    }

    #[test]
    fn priority_dominates_footprint() {
        let snap = ClusterSnapshot::new(
            vec![make_node("b"), make_node("a")],
            vec![make_alloc("a", "batch", 50, 50), make_alloc("b", "api", 5, 5)],
            vec![],
            vec![job("batch", 0), job("api", 5)],
        );

        let ranked = rank_nodes_for_removal(&snap, "dc1");
        assert_eq!(order(&ranked), vec!["a", "b"]);
        assert_eq!(ranked[0].footprint, 100);
        assert_eq!(ranked[1].highest_job_priority, 5);
    }

    #[test]
    fn footprint_breaks_priority_ties() {
        let snap = ClusterSnapshot::new(
            vec![make_node("n1"), make_node("n2")],
            vec![make_alloc("n1", "web", 300, 300), make_alloc("n2", "web", 100, 100)],
            vec![],
            vec![job("web", 50)],
        );
        assert_eq!(order(&rank_nodes_for_removal(&snap, "dc1")), vec!["n2", "n1"]);
    }

    #[test]
    fn idle_nodes_sort_first() {
        let snap = ClusterSnapshot::new(
            vec![make_node("busy"), make_node("idle")],
            vec![make_alloc("busy", "web", 1, 1)],
            vec![],
            vec![job("web", 1)],
        );

        let ranked = rank_nodes_for_removal(&snap, "dc1");
        assert_eq!(order(&ranked), vec!["idle", "busy"]);
        assert_eq!(ranked[0].highest_job_priority, 0);
        assert_eq!(ranked[0].footprint, 0);
    }

    #[test]
    fn highest_priority_on_node_wins() {
        let snap = ClusterSnapshot::new(
            vec![make_node("n1")],
            vec![make_alloc("n1", "low", 1, 1), make_alloc("n1", "high", 1, 1)],
            vec![],
            vec![job("low", 10), job("high", 90)],
        );
        assert_eq!(rank_nodes_for_removal(&snap, "dc1")[0].highest_job_priority, 90);
    }

    #[test]
    fn ineligible_nodes_are_not_candidates() {
        let mut down = make_node("down");
        down.ready = false;
        let snap = ClusterSnapshot::new(vec![down, make_node("up")], vec![], vec![], vec![]);
        assert_eq!(order(&rank_nodes_for_removal(&snap, "dc1")), vec!["up"]);
    }
}
