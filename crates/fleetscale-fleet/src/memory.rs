//! In-memory fleet for tests and dry runs against fixtures.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{FleetError, FleetResult};
use crate::group::ManagedGroup;
use crate::provider::FleetProvider;

/// A mutation the in-memory fleet applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FleetOp {
    CreateGroup { name: String, instance_type: String },
    DeleteGroup { name: String },
    TerminateInstance { node_id: String },
    SetDesiredCapacity { group: String, desired: u32 },
    SetMaxCapacity { group: String, max: u32 },
}

#[derive(Debug, Default)]
struct FleetState {
    groups: BTreeMap<String, ManagedGroup>,
    /// node id → owning group name
    node_groups: BTreeMap<String, String>,
    /// launch template → newest version
    latest_versions: BTreeMap<String, String>,
    failing_targets: BTreeSet<String>,
    ops: Vec<FleetOp>,
}

/// Fleet provider backed by a map of groups.
///
/// Records every successful mutation in order. Calls naming a target
/// registered with [`fail_for`](Self::fail_for) (a group name or node id)
/// fail with [`FleetError::Api`] and are not recorded.
#[derive(Debug)]
pub struct InMemoryFleet {
    managed_prefix: String,
    launch_template: String,
    state: Mutex<FleetState>,
}

impl Default for InMemoryFleet {
    fn default() -> Self {
        Self::new("nm-auto-")
    }
}

impl InMemoryFleet {
    pub fn new(managed_prefix: &str) -> Self {
        Self {
            managed_prefix: managed_prefix.to_string(),
            launch_template: "workers".to_string(),
            state: Mutex::new(FleetState::default()),
        }
    }

    pub fn with_group(mut self, group: ManagedGroup) -> Self {
        let state = self.state.get_mut();
        for member in &group.members {
            state.node_groups.insert(member.instance_id.clone(), group.name.clone());
        }
        state.groups.insert(group.name.clone(), group);
        self
    }

    /// Attach a node to a group without listing it as a member.
    pub fn with_node(mut self, node_id: &str, group: &str) -> Self {
        self.state
            .get_mut()
            .node_groups
            .insert(node_id.to_string(), group.to_string());
        self
    }

    pub fn with_latest_version(mut self, launch_template: &str, version: &str) -> Self {
        self.state
            .get_mut()
            .latest_versions
            .insert(launch_template.to_string(), version.to_string());
        self
    }

    /// Make every call that targets `target` fail.
    pub async fn fail_for(&self, target: &str) {
        self.state.lock().await.failing_targets.insert(target.to_string());
    }

    /// Successful mutations, oldest first.
    pub async fn operations(&self) -> Vec<FleetOp> {
        self.state.lock().await.ops.clone()
    }

    pub async fn group(&self, name: &str) -> Option<ManagedGroup> {
        self.state.lock().await.groups.get(name).cloned()
    }

    fn is_managed(&self, name: &str) -> bool {
        name.contains(&self.managed_prefix)
    }
}

fn check_target(state: &FleetState, command: &str, target: &str) -> FleetResult<()> {
    if state.failing_targets.contains(target) {
        return Err(FleetError::api(command, format!("injected failure for {target}")));
    }
    Ok(())
}

#[async_trait]
impl FleetProvider for InMemoryFleet {
    async fn create_group(&self, name: &str, instance_type: &str) -> FleetResult<()> {
        let mut state = self.state.lock().await;
        check_target(&state, "create-group", name)?;
        state.groups.insert(
            name.to_string(),
            ManagedGroup {
                name: name.to_string(),
                desired_capacity: 1,
                max_capacity: 2,
                launch_template: self.launch_template.clone(),
                members: Vec::new(),
            },
        );
        state.ops.push(FleetOp::CreateGroup {
            name: name.to_string(),
            instance_type: instance_type.to_string(),
        });
        debug!(group = %name, %instance_type, "in-memory group created");
        Ok(())
    }

    async fn delete_group_or_terminate(&self, node_id: &str) -> FleetResult<()> {
        let mut state = self.state.lock().await;
        check_target(&state, "delete-group-or-terminate", node_id)?;

        let owner = state.node_groups.remove(node_id);
        match owner {
            Some(group) if self.is_managed(&group) => {
                state.groups.remove(&group);
                state.node_groups.retain(|_, g| *g != group);
                state.ops.push(FleetOp::DeleteGroup { name: group });
            }
            owner => {
                if let Some(name) = owner
                    && let Some(g) = state.groups.get_mut(&name)
                {
                    g.members.retain(|m| m.instance_id != node_id);
                    g.desired_capacity = g.desired_capacity.saturating_sub(1);
                }
                state.ops.push(FleetOp::TerminateInstance {
                    node_id: node_id.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn list_managed_groups(&self) -> FleetResult<Vec<ManagedGroup>> {
        let state = self.state.lock().await;
        Ok(state
            .groups
            .values()
            .filter(|g| self.is_managed(&g.name))
            .cloned()
            .collect())
    }

    async fn latest_launch_version(&self, group: &ManagedGroup) -> FleetResult<String> {
        let state = self.state.lock().await;
        check_target(&state, "latest-launch-version", &group.name)?;
        state
            .latest_versions
            .get(&group.launch_template)
            .cloned()
            .ok_or_else(|| {
                FleetError::NotFound(format!("launch template {}", group.launch_template))
            })
    }

    async fn set_desired_capacity(&self, group: &str, desired: u32) -> FleetResult<()> {
        let mut state = self.state.lock().await;
        check_target(&state, "set-desired-capacity", group)?;
        let g = state
            .groups
            .get_mut(group)
            .ok_or_else(|| FleetError::NotFound(format!("group {group}")))?;
        g.desired_capacity = desired;
        state.ops.push(FleetOp::SetDesiredCapacity {
            group: group.to_string(),
            desired,
        });
        Ok(())
    }

    async fn set_max_capacity(&self, group: &str, max: u32) -> FleetResult<()> {
        let mut state = self.state.lock().await;
        check_target(&state, "set-max-capacity", group)?;
        let g = state
            .groups
            .get_mut(group)
            .ok_or_else(|| FleetError::NotFound(format!("group {group}")))?;
        g.max_capacity = max;
        state.ops.push(FleetOp::SetMaxCapacity {
            group: group.to_string(),
            max,
        });
        Ok(())
    }
}
