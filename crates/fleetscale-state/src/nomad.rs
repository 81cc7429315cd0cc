//! Nomad HTTP API client.
//!
//! Implements [`ClusterStateProvider`] against the scheduler's REST API.
//! Responses are decoded into PascalCase wire structs and then reduced to
//! the domain types in [`crate::types`].

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::error::{StateError, StateResult};
use crate::provider::ClusterStateProvider;
use crate::types::*;

/// Connection settings for the Nomad API.
#[derive(Debug, Clone, Default)]
pub struct NomadConfig {
    /// Base address, e.g. `http://127.0.0.1:4646`.
    pub address: String,
    /// ACL token sent as `X-Nomad-Token`.
    pub token: Option<String>,
    /// HTTP basic auth credentials.
    pub basic_auth: Option<(String, String)>,
}

/// Client for the Nomad REST API.
#[derive(Debug, Clone)]
pub struct NomadClient {
    config: NomadConfig,
    client: reqwest::Client,
}

impl NomadClient {
    pub fn new(config: NomadConfig) -> StateResult<Self> {
        if config.address.trim().is_empty() {
            return Err(StateError::Config("nomad address is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| StateError::Config(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.address.trim_end_matches('/'), path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> StateResult<T> {
        let mut request = self.client.get(self.url(path));
        if let Some(token) = &self.config.token {
            request = request.header("X-Nomad-Token", token);
        }
        if let Some((user, pass)) = &self.config.basic_auth {
            request = request.basic_auth(user, Some(pass));
        }

        let response = request.send().await.map_err(|e| {
            error!(%path, error = %e, "failed to query nomad api");
            StateError::Unavailable {
                endpoint: path.to_string(),
                reason: e.to_string(),
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            error!(%path, status = status.as_u16(), "nomad api returned an error status");
            return Err(StateError::Status {
                endpoint: path.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.json::<T>().await.map_err(|e| StateError::Decode {
            endpoint: path.to_string(),
            reason: e.to_string(),
        })?;
        debug!(%path, "queried nomad api");
        Ok(body)
    }
}

#[async_trait]
impl ClusterStateProvider for NomadClient {
    async fn nodes(&self) -> StateResult<Vec<Node>> {
        let wire: Vec<WireNode> = self.get_json("/v1/nodes?resources=true").await?;
        Ok(wire.into_iter().map(Node::from).collect())
    }

    async fn allocations(&self) -> StateResult<Vec<Allocation>> {
        let wire: Vec<WireAllocation> = self.get_json("/v1/allocations?resources=true").await?;
        Ok(wire.into_iter().map(Allocation::from).collect())
    }

    async fn evaluations(&self) -> StateResult<Vec<Evaluation>> {
        let wire: Vec<WireEvaluation> = self.get_json("/v1/evaluations").await?;
        Ok(wire.into_iter().map(Evaluation::from).collect())
    }

    async fn jobs(&self) -> StateResult<BTreeMap<JobId, JobMeta>> {
        let wire: Vec<WireJobListStub> = self.get_json("/v1/jobs").await?;
        Ok(wire
            .into_iter()
            .map(JobMeta::from)
            .map(|j| (j.id.clone(), j))
            .collect())
    }

    async fn job_details(&self, job_id: &str) -> StateResult<JobSpec> {
        let path = job_path(job_id);
        match self.get_json::<WireJob>(&path).await {
            Ok(job) => Ok(JobSpec::from(job)),
            Err(StateError::Status { status: 404, .. }) => {
                Err(StateError::JobNotFound(job_id.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

/// Job ids may contain `/` and other reserved characters.
fn job_path(job_id: &str) -> String {
    format!("/v1/job/{}", urlencoding::encode(job_id))
}

// ── Wire types ────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct WireCpu {
    cpu_shares: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireMemory {
    #[serde(rename = "MemoryMB")]
    memory_mb: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct WireResources {
    cpu: WireCpu,
    memory: WireMemory,
}

impl From<&WireResources> for ResourceQuantity {
    fn from(r: &WireResources) -> Self {
        ResourceQuantity::new(r.cpu.cpu_shares, r.memory.memory_mb)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireNode {
    name: String,
    #[serde(default)]
    datacenter: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    scheduling_eligibility: String,
    #[serde(default)]
    node_resources: Option<WireResources>,
    #[serde(default)]
    reserved_resources: Option<WireResources>,
}

impl From<WireNode> for Node {
    fn from(n: WireNode) -> Self {
        Node {
            total_resources: n.node_resources.as_ref().map(Into::into).unwrap_or_default(),
            reserved_resources: n
                .reserved_resources
                .as_ref()
                .map(Into::into)
                .unwrap_or_default(),
            ready: n.status == "ready",
            eligible: n.scheduling_eligibility == "eligible",
            datacenter: n.datacenter,
            id: n.name,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct WireAllocatedResources {
    tasks: HashMap<String, WireResources>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct WireTaskState {
    state: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireAllocation {
    #[serde(rename = "ID")]
    id: String,
    node_name: String,
    #[serde(rename = "JobID")]
    job_id: String,
    #[serde(default)]
    client_status: String,
    #[serde(default)]
    desired_status: String,
    #[serde(default)]
    allocated_resources: Option<WireAllocatedResources>,
    #[serde(default)]
    task_states: Option<HashMap<String, WireTaskState>>,
}

impl From<WireAllocation> for Allocation {
    fn from(a: WireAllocation) -> Self {
        let desired = if a.desired_status == "run" {
            DesiredStatus::Run
        } else {
            DesiredStatus::Stop
        };
        let lifecycle = match a.client_status.as_str() {
            "running" => AllocationStatus::Running,
            "pending" => AllocationStatus::Pending,
            _ => AllocationStatus::Other,
        };

        // Only tasks that are running, or pending while the allocation
        // should run, hold resources.
        let mut resources = ResourceQuantity::ZERO;
        if let (Some(allocated), Some(states)) = (&a.allocated_resources, &a.task_states) {
            for (task, task_resources) in &allocated.tasks {
                let Some(state) = states.get(task) else {
                    continue;
                };
                let holds = state.state == "running"
                    || (desired == DesiredStatus::Run && state.state == "pending");
                if holds {
                    resources += ResourceQuantity::from(task_resources);
                }
            }
        }

        Allocation {
            id: a.id,
            node_id: a.node_name,
            job_id: a.job_id,
            resources,
            lifecycle,
            desired,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireExhausted {
    #[serde(rename = "CPU")]
    cpu: u64,
    #[serde(rename = "MemoryMB")]
    memory_mb: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct WireAllocMetric {
    nodes_available: Option<BTreeMap<String, u64>>,
    resources_exhausted: Option<BTreeMap<String, WireExhausted>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireEvaluation {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "JobID")]
    job_id: String,
    status: String,
    #[serde(rename = "FailedTGAllocs", default)]
    failed_tg_allocs: Option<BTreeMap<String, WireAllocMetric>>,
}

impl From<WireEvaluation> for Evaluation {
    fn from(e: WireEvaluation) -> Self {
        let status = match e.status.as_str() {
            "blocked" => EvaluationStatus::Blocked,
            "pending" => EvaluationStatus::Pending,
            "complete" => EvaluationStatus::Complete,
            _ => EvaluationStatus::Other,
        };
        let failed_task_groups = e
            .failed_tg_allocs
            .unwrap_or_default()
            .into_iter()
            .map(|(group, metric)| {
                let failed = FailedTaskGroup {
                    datacenters: metric.nodes_available.unwrap_or_default().into_keys().collect(),
                    exhausted: metric
                        .resources_exhausted
                        .unwrap_or_default()
                        .into_iter()
                        .map(|(task, r)| (task, ResourceQuantity::new(r.cpu, r.memory_mb)))
                        .collect(),
                };
                (group, failed)
            })
            .collect();

        Evaluation {
            id: e.id,
            job_id: e.job_id,
            status,
            failed_task_groups,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct WireTaskGroupSummary {
    queued: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct WireJobSummary {
    summary: BTreeMap<String, WireTaskGroupSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireJobListStub {
    #[serde(rename = "ID")]
    id: String,
    #[serde(default)]
    priority: u32,
    #[serde(default)]
    job_summary: Option<WireJobSummary>,
}

impl From<WireJobListStub> for JobMeta {
    fn from(j: WireJobListStub) -> Self {
        JobMeta {
            id: j.id,
            priority: j.priority,
            queued: j
                .job_summary
                .unwrap_or_default()
                .summary
                .into_iter()
                .map(|(group, s)| (group, s.queued))
                .collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireTaskResources {
    #[serde(rename = "CPU")]
    cpu: u64,
    #[serde(rename = "MemoryMB")]
    memory_mb: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct WireTask {
    resources: WireTaskResources,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct WireTaskGroup {
    name: String,
    count: u32,
    tasks: Vec<WireTask>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireJob {
    #[serde(rename = "ID")]
    id: String,
    #[serde(default)]
    task_groups: Vec<WireTaskGroup>,
}

impl From<WireJob> for JobSpec {
    fn from(j: WireJob) -> Self {
        JobSpec {
            id: j.id,
            task_groups: j
                .task_groups
                .into_iter()
                .map(|g| TaskGroupSpec {
                    per_instance: g
                        .tasks
                        .iter()
                        .map(|t| ResourceQuantity::new(t.resources.cpu, t.resources.memory_mb))
                        .sum(),
                    name: g.name,
                    count: g.count,
                })
                .collect(),
        }
    }
}
