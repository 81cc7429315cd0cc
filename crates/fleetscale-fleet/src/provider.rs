//! The fleet provider seam.
//!
//! Scaling intents and fleet refreshes reach the cloud only through
//! [`FleetProvider`]. [`AwsFleet`](crate::AwsFleet) is the production
//! backend; [`InMemoryFleet`](crate::InMemoryFleet) backs the tests.

use async_trait::async_trait;

use crate::error::FleetResult;
use crate::group::ManagedGroup;

/// Mutations and queries against the cloud fleet.
#[async_trait]
pub trait FleetProvider: Send + Sync {
    /// Create a managed group running one instance of `instance_type`.
    async fn create_group(&self, name: &str, instance_type: &str) -> FleetResult<()>;

    /// Remove the managed group owning `node_id`, or terminate only that
    /// instance when its group is not managed by the autoscaler.
    async fn delete_group_or_terminate(&self, node_id: &str) -> FleetResult<()>;

    /// Groups identified as managed by the naming convention.
    async fn list_managed_groups(&self) -> FleetResult<Vec<ManagedGroup>>;

    /// Newest launch template version for the group's template.
    async fn latest_launch_version(&self, group: &ManagedGroup) -> FleetResult<String>;

    async fn set_desired_capacity(&self, group: &str, desired: u32) -> FleetResult<()>;

    async fn set_max_capacity(&self, group: &str, max: u32) -> FleetResult<()>;
}
