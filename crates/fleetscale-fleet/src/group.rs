//! Managed instance group model.

use serde::{Deserialize, Serialize};

/// A running member of a managed group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub instance_id: String,
    /// Launch template version the instance was started from, if tagged.
    pub launch_version: Option<String>,
}

/// A fleet group created and owned by the autoscaler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedGroup {
    pub name: String,
    pub desired_capacity: u32,
    pub max_capacity: u32,
    pub launch_template: String,
    pub members: Vec<GroupMember>,
}

impl ManagedGroup {
    /// Members not running `latest`. Untagged members count as stale.
    pub fn stale_members<'a>(
        &'a self,
        latest: &'a str,
    ) -> impl Iterator<Item = &'a GroupMember> + 'a {
        self.members
            .iter()
            .filter(move |m| m.launch_version.as_deref() != Some(latest))
    }

    pub fn is_stale(&self, latest: &str) -> bool {
        self.stale_members(latest).next().is_some()
    }
}
