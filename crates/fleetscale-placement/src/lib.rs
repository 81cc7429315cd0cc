//! fleetscale-placement: capacity arithmetic for scaling decisions.
//!
//! This crate answers the three placement questions the decision engine
//! asks. It never talks to the scheduler or the cloud; it works on an
//! already-captured snapshot and the static instance catalog.
//!
//! # Components
//!
//! - **`provisioner`**: cheapest machine-type combination for blocked demand
//! - **`drain`**: whether a node's workload fits on the rest of the fleet
//! - **`ranker`**: removal order (priority, then footprint)
//! - **`catalog`**: instance-type catalog loading
//! - **`convert`**: snapshot records to placement inputs

pub mod catalog;
pub mod convert;
pub mod drain;
pub mod error;
pub mod provisioner;
pub mod ranker;

pub use catalog::{InstanceCatalog, InstanceType};
pub use convert::{capacity_after, node_to_capacity, node_workload, workloads_by_node};
pub use drain::{DrainContext, NodeCapacity, WorkloadUnit, can_drain, can_place_all};
pub use error::{PlacementError, PlacementResult};
pub use provisioner::{ProvisionJob, ProvisionPlan, ProvisionedInstance, cheapest_combination};
pub use ranker::{RemovalCandidate, rank_nodes_for_removal};
