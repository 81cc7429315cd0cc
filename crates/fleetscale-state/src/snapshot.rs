//! Point-in-time cluster snapshot.
//!
//! A [`ClusterSnapshot`] is captured once per control-loop iteration and
//! every decision in that iteration reads only from it. It is never
//! mutated after capture.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, warn};

use crate::error::{StateError, StateResult};
use crate::provider::ClusterStateProvider;
use crate::types::*;

/// Immutable view of the cluster used for one scaling decision.
#[derive(Debug, Clone, Default)]
pub struct ClusterSnapshot {
    nodes: Vec<Node>,
    /// node id → position in `nodes`
    node_index: HashMap<NodeId, usize>,
    allocations: Vec<Allocation>,
    evaluations: Vec<Evaluation>,
    jobs: BTreeMap<JobId, JobMeta>,
    job_specs: BTreeMap<JobId, JobSpec>,
}

impl ClusterSnapshot {
    /// Assemble a snapshot from already-fetched parts.
    pub fn new(
        nodes: Vec<Node>,
        allocations: Vec<Allocation>,
        evaluations: Vec<Evaluation>,
        jobs: Vec<JobMeta>,
    ) -> Self {
        Self {
            node_index: index_nodes(&nodes),
            nodes,
            allocations,
            evaluations,
            jobs: jobs.into_iter().map(|j| (j.id.clone(), j)).collect(),
            job_specs: BTreeMap::new(),
        }
    }

    /// Attach a full job definition.
    pub fn with_job_spec(mut self, spec: JobSpec) -> Self {
        self.job_specs.insert(spec.id.clone(), spec);
        self
    }

    /// Read the whole cluster state from `provider`.
    ///
    /// Job definitions are fetched only for jobs with blocked evaluations,
    /// since only blocked-demand sizing needs them. A job that disappeared
    /// between the evaluation list and the detail read is skipped; any
    /// other failure aborts the capture.
    pub async fn capture<P>(provider: &P) -> StateResult<Self>
    where
        P: ClusterStateProvider + ?Sized,
    {
        let nodes = provider.nodes().await?;
        let allocations = provider.allocations().await?;
        let evaluations = provider.evaluations().await?;
        let jobs = provider.jobs().await?;

        let blocked_jobs: BTreeSet<&str> = evaluations
            .iter()
            .filter(|e| e.status == EvaluationStatus::Blocked)
            .map(|e| e.job_id.as_str())
            .collect();

        let mut job_specs = BTreeMap::new();
        for job_id in blocked_jobs {
            match provider.job_details(job_id).await {
                Ok(spec) => {
                    job_specs.insert(spec.id.clone(), spec);
                }
                Err(StateError::JobNotFound(id)) => {
                    warn!(job = %id, "blocked evaluation references unknown job");
                }
                Err(e) => return Err(e),
            }
        }

        debug!(
            nodes = nodes.len(),
            allocations = allocations.len(),
            evaluations = evaluations.len(),
            jobs = jobs.len(),
            job_specs = job_specs.len(),
            "cluster snapshot captured"
        );

        Ok(Self {
            node_index: index_nodes(&nodes),
            nodes,
            allocations,
            evaluations,
            jobs,
            job_specs,
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn allocations(&self) -> &[Allocation] {
        &self.allocations
    }

    pub fn evaluations(&self) -> &[Evaluation] {
        &self.evaluations
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.node_index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn job(&self, id: &str) -> Option<&JobMeta> {
        self.jobs.get(id)
    }

    pub fn job_spec(&self, id: &str) -> Option<&JobSpec> {
        self.job_specs.get(id)
    }

    /// Scheduling priority of a job, 0 when the job is unknown.
    pub fn job_priority(&self, id: &str) -> u32 {
        self.jobs.get(id).map_or(0, |j| j.priority)
    }

    /// Nodes that take part in scaling for `datacenter`, in snapshot order.
    pub fn eligible_nodes<'a>(&'a self, datacenter: &'a str) -> impl Iterator<Item = &'a Node> {
        self.nodes.iter().filter(move |n| n.is_eligible_in(datacenter))
    }

    /// Allocations that count toward demand in `datacenter`, in snapshot
    /// order. An allocation belongs to the datacenter of its node.
    pub fn counted_allocations<'a>(
        &'a self,
        datacenter: &'a str,
    ) -> impl Iterator<Item = &'a Allocation> {
        self.allocations.iter().filter(move |a| {
            a.is_counted()
                && self
                    .node(&a.node_id)
                    .is_some_and(|n| n.datacenter == datacenter)
        })
    }
}

/// First occurrence wins when the scheduler reports a node id twice.
fn index_nodes(nodes: &[Node]) -> HashMap<NodeId, usize> {
    let mut index = HashMap::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        index.entry(node.id.clone()).or_insert(i);
    }
    index
}
