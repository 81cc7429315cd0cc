//! fleetscale-fleet: the cloud side of the autoscaler.
//!
//! Defines [`FleetProvider`], the only way scaling intents and fleet
//! refreshes reach the cloud, plus two implementations:
//!
//! - **`aws`**: EC2 Auto Scaling through the AWS SDK
//! - **`memory`**: in-memory groups that record every mutation
//!
//! A *managed group* is a group created by the autoscaler. Managed groups
//! are recognized by a name prefix (`nm-auto-` by default).

pub mod aws;
pub mod error;
pub mod group;
pub mod memory;
pub mod provider;

pub use aws::{AwsFleet, AwsFleetConfig};
pub use error::{FleetError, FleetResult};
pub use group::{GroupMember, ManagedGroup};
pub use memory::{FleetOp, InMemoryFleet};
pub use provider::FleetProvider;
