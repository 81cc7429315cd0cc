//! fleetscale-state: cluster state for scaling decisions.
//!
//! Reads the scheduler's view of the cluster (nodes, allocations,
//! evaluations, jobs) into an immutable [`ClusterSnapshot`] and reduces it
//! to datacenter-level demand, supply, utilization and blocked demand.
//!
//! # Architecture
//!
//! ```text
//! NomadClient ──▶ CachedStateProvider ──▶ ClusterSnapshot::capture
//!   (HTTP)         (read-through TTL)        (one per iteration)
//!                                                  │
//!                                                  ▼
//!                                   aggregate::{total_demand, total_supply,
//!                                               blocked_demand, Utilization}
//! ```
//!
//! Everything downstream of the snapshot is synchronous and pure.

pub mod aggregate;
pub mod cache;
pub mod error;
pub mod nomad;
pub mod provider;
pub mod snapshot;
pub mod types;

pub use aggregate::{Utilization, blocked_demand, has_supply, total_demand, total_supply};
pub use cache::{CachedStateProvider, DEFAULT_CACHE_TTL, TtlCache};
pub use error::{StateError, StateResult};
pub use nomad::{NomadClient, NomadConfig};
pub use provider::{ClusterStateProvider, StaticStateProvider};
pub use snapshot::ClusterSnapshot;
pub use types::*;
