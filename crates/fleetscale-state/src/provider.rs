//! The cluster state provider seam.
//!
//! The control loop only ever talks to the scheduler through
//! [`ClusterStateProvider`]. The production implementation is
//! [`NomadClient`](crate::nomad::NomadClient); tests use
//! [`StaticStateProvider`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::{StateError, StateResult};
use crate::types::*;

/// Read-only access to the scheduler's view of the cluster.
#[async_trait]
pub trait ClusterStateProvider: Send + Sync {
    async fn nodes(&self) -> StateResult<Vec<Node>>;

    async fn allocations(&self) -> StateResult<Vec<Allocation>>;

    async fn evaluations(&self) -> StateResult<Vec<Evaluation>>;

    /// Job id → job list entry.
    async fn jobs(&self) -> StateResult<BTreeMap<JobId, JobMeta>>;

    /// Full job definition. Fails with [`StateError::JobNotFound`] for
    /// unknown jobs.
    async fn job_details(&self, job_id: &str) -> StateResult<JobSpec>;
}

/// A provider that serves canned data.
///
/// Used by tests across the workspace. Can be switched into a failing
/// mode to exercise the fail-closed paths, and counts calls so caching
/// layers can be verified.
#[derive(Debug, Default)]
pub struct StaticStateProvider {
    pub nodes: Vec<Node>,
    pub allocations: Vec<Allocation>,
    pub evaluations: Vec<Evaluation>,
    pub jobs: BTreeMap<JobId, JobMeta>,
    pub job_specs: BTreeMap<JobId, JobSpec>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl StaticStateProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nodes(mut self, nodes: Vec<Node>) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn with_allocations(mut self, allocations: Vec<Allocation>) -> Self {
        self.allocations = allocations;
        self
    }

    pub fn with_evaluations(mut self, evaluations: Vec<Evaluation>) -> Self {
        self.evaluations = evaluations;
        self
    }

    pub fn with_jobs(mut self, jobs: Vec<JobMeta>) -> Self {
        self.jobs = jobs.into_iter().map(|j| (j.id.clone(), j)).collect();
        self
    }

    pub fn with_job_spec(mut self, spec: JobSpec) -> Self {
        self.job_specs.insert(spec.id.clone(), spec);
        self
    }

    /// Make every subsequent read fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of reads served so far, failed ones included.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self, endpoint: &str) -> StateResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StateError::Unavailable {
                endpoint: endpoint.to_string(),
                reason: "provider set to fail".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterStateProvider for StaticStateProvider {
    async fn nodes(&self) -> StateResult<Vec<Node>> {
        self.check("nodes")?;
        Ok(self.nodes.clone())
    }

    async fn allocations(&self) -> StateResult<Vec<Allocation>> {
        self.check("allocations")?;
        Ok(self.allocations.clone())
    }

    async fn evaluations(&self) -> StateResult<Vec<Evaluation>> {
        self.check("evaluations")?;
        Ok(self.evaluations.clone())
    }

    async fn jobs(&self) -> StateResult<BTreeMap<JobId, JobMeta>> {
        self.check("jobs")?;
        Ok(self.jobs.clone())
    }

    async fn job_details(&self, job_id: &str) -> StateResult<JobSpec> {
        self.check("job")?;
        self.job_specs
            .get(job_id)
            .cloned()
            .ok_or_else(|| StateError::JobNotFound(job_id.to_string()))
    }
}
