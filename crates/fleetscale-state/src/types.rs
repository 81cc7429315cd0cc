//! Domain types for cluster state.
//!
//! These mirror what the scheduler reports about nodes, allocations,
//! evaluations and jobs, reduced to the fields scaling decisions need.
//! Resource amounts are CPU shares and memory megabytes.

use std::collections::BTreeMap;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// Unique identifier (name) of a scheduler node.
pub type NodeId = String;

/// Unique identifier of a job.
pub type JobId = String;

// ── Resources ─────────────────────────────────────────────────────

/// An amount of CPU shares and memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceQuantity {
    pub cpu: u64,
    pub memory_mb: u64,
}

impl ResourceQuantity {
    pub const ZERO: Self = Self { cpu: 0, memory_mb: 0 };

    pub const fn new(cpu: u64, memory_mb: u64) -> Self {
        Self { cpu, memory_mb }
    }

    /// The amount of a single resource.
    pub fn get(&self, kind: ResourceKind) -> u64 {
        match kind {
            ResourceKind::Cpu => self.cpu,
            ResourceKind::Memory => self.memory_mb,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.cpu == 0 && self.memory_mb == 0
    }
}

impl Add for ResourceQuantity {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            cpu: self.cpu + rhs.cpu,
            memory_mb: self.memory_mb + rhs.memory_mb,
        }
    }
}

impl AddAssign for ResourceQuantity {
    fn add_assign(&mut self, rhs: Self) {
        self.cpu += rhs.cpu;
        self.memory_mb += rhs.memory_mb;
    }
}

impl Sum for ResourceQuantity {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

/// Which resource a scaling decision is constrained by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Cpu,
    Memory,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Cpu => f.write_str("CPUShares"),
            ResourceKind::Memory => f.write_str("MemoryMB"),
        }
    }
}

// ── Node ──────────────────────────────────────────────────────────

/// A worker node as reported by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub datacenter: String,
    /// Scheduling eligibility (not draining, not marked ineligible).
    pub eligible: bool,
    /// Client status is `ready`.
    pub ready: bool,
    pub total_resources: ResourceQuantity,
    /// Resources held back for the node's own agents.
    pub reserved_resources: ResourceQuantity,
}

impl Node {
    /// Whether this node takes part in scaling decisions for `datacenter`.
    pub fn is_eligible_in(&self, datacenter: &str) -> bool {
        self.ready && self.eligible && self.datacenter == datacenter
    }
}

// ── Allocation ────────────────────────────────────────────────────

/// Client-side lifecycle state of an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStatus {
    Running,
    Pending,
    Other,
}

/// What the scheduler wants the allocation to be doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesiredStatus {
    Run,
    Stop,
}

/// One placed instance of a job's task group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: String,
    pub node_id: NodeId,
    pub job_id: JobId,
    pub resources: ResourceQuantity,
    pub lifecycle: AllocationStatus,
    pub desired: DesiredStatus,
}

impl Allocation {
    /// Whether this allocation counts toward demand.
    pub fn is_counted(&self) -> bool {
        self.desired == DesiredStatus::Run
            && matches!(
                self.lifecycle,
                AllocationStatus::Running | AllocationStatus::Pending
            )
    }
}

// ── Evaluation ────────────────────────────────────────────────────

/// Scheduler evaluation status. Only `Blocked` matters for scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    Blocked,
    Pending,
    Complete,
    #[serde(other)]
    Other,
}

/// A task group the scheduler failed to place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTaskGroup {
    /// Datacenters that were considered for placement.
    pub datacenters: Vec<String>,
    /// Task name → the resources that could not be satisfied.
    pub exhausted: BTreeMap<String, ResourceQuantity>,
}

impl FailedTaskGroup {
    pub fn exhausted_total(&self) -> ResourceQuantity {
        self.exhausted.values().copied().sum()
    }
}

/// A scheduling attempt for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: String,
    pub job_id: JobId,
    pub status: EvaluationStatus,
    /// Task group name → failure details.
    pub failed_task_groups: BTreeMap<String, FailedTaskGroup>,
}

// ── Jobs ──────────────────────────────────────────────────────────

/// Job list entry: priority plus the per-group queued counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMeta {
    pub id: JobId,
    pub priority: u32,
    /// Task group name → number of queued (unplaced) instances.
    pub queued: BTreeMap<String, u32>,
}

/// Declared shape of a task group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskGroupSpec {
    pub name: String,
    pub count: u32,
    /// Sum of the group's task resources, i.e. one instance of the group.
    pub per_instance: ResourceQuantity,
}

/// Full job definition, fetched on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub id: JobId,
    pub task_groups: Vec<TaskGroupSpec>,
}

impl JobSpec {
    pub fn task_group(&self, name: &str) -> Option<&TaskGroupSpec> {
        self.task_groups.iter().find(|g| g.name == name)
    }
}

// ── Blocked demand ────────────────────────────────────────────────

/// Aggregate and peak resource requests the scheduler could not place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedDemand {
    pub total_cpu: u64,
    pub total_memory_mb: u64,
    /// Largest single task-group CPU requirement seen.
    pub max_cpu: u64,
    /// Largest single task-group memory requirement seen.
    pub max_memory_mb: u64,
}

impl BlockedDemand {
    /// True when nothing is blocked.
    pub fn is_empty(&self) -> bool {
        self.total_cpu == 0 && self.total_memory_mb == 0
    }
}
