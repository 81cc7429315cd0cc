//! Refresh controller: the per-group refresh state machine.
//!
//! A stale group is refreshed in one surge-then-retire cycle:
//!
//! ```text
//! Pending ─start─▶ RaisingCeiling ─▶ SurgingUp ─▶ AwaitingSurge
//!                                                     │
//!            Completed ◀─ AwaitingRetire ◀─ Retiring ◀┘
//! ```
//!
//! Each [`GroupRefresh::advance`] call yields the next action to execute.
//! The fleet's oldest-first termination policy picks the stale member when
//! desired capacity drops back.

use std::time::Duration;

use tracing::{debug, info, warn};

use fleetscale_fleet::ManagedGroup;

use crate::config::RefreshConfig;

/// Current phase of a group refresh.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RefreshPhase {
    Pending,
    /// Make room for one extra member.
    RaisingCeiling,
    /// Add the replacement member.
    SurgingUp,
    /// Wait for the replacement to boot and register.
    AwaitingSurge,
    /// Drop desired capacity back to its original value.
    Retiring,
    /// Wait for the stale member to terminate.
    AwaitingRetire,
    Completed,
    Failed { reason: String },
}

/// One step of a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshAction {
    SetMaxCapacity(u32),
    SetDesiredCapacity(u32),
    Wait(Duration),
}

/// A refresh of one managed group in progress.
#[derive(Debug, Clone)]
pub struct GroupRefresh {
    pub group: String,
    pub phase: RefreshPhase,
    pub original_desired: u32,
    pub original_max: u32,
    pub latest_version: String,
    config: RefreshConfig,
}

impl GroupRefresh {
    pub fn new(group: &ManagedGroup, latest_version: &str, config: RefreshConfig) -> Self {
        Self {
            group: group.name.clone(),
            phase: RefreshPhase::Pending,
            original_desired: group.desired_capacity,
            original_max: group.max_capacity,
            latest_version: latest_version.to_string(),
            config,
        }
    }

    pub fn start(&mut self) {
        if self.phase == RefreshPhase::Pending {
            self.phase = RefreshPhase::RaisingCeiling;
            info!(
                group = %self.group,
                desired = self.original_desired,
                latest_version = %self.latest_version,
                "starting group refresh"
            );
        }
    }

    /// Desired capacity while the replacement runs alongside the old member.
    pub fn surge_capacity(&self) -> u32 {
        self.original_desired + 1
    }

    /// Capacity ceiling needed for the surge. Never lowers an existing ceiling.
    pub fn surge_ceiling(&self) -> u32 {
        self.original_max.max(self.surge_capacity())
    }

    /// Advance one step. Returns `None` once the refresh is finished,
    /// failed, or not yet started.
    pub fn advance(&mut self) -> Option<RefreshAction> {
        let (next, action) = match &self.phase {
            RefreshPhase::Pending | RefreshPhase::Completed | RefreshPhase::Failed { .. } => {
                return None;
            }

            RefreshPhase::RaisingCeiling => (
                RefreshPhase::SurgingUp,
                RefreshAction::SetMaxCapacity(self.surge_ceiling()),
            ),
            RefreshPhase::SurgingUp => (
                RefreshPhase::AwaitingSurge,
                RefreshAction::SetDesiredCapacity(self.surge_capacity()),
            ),
            RefreshPhase::AwaitingSurge => (
                RefreshPhase::Retiring,
                RefreshAction::Wait(self.config.surge_wait()),
            ),
            RefreshPhase::Retiring => (
                RefreshPhase::AwaitingRetire,
                RefreshAction::SetDesiredCapacity(self.original_desired),
            ),
            RefreshPhase::AwaitingRetire => (
                RefreshPhase::Completed,
                RefreshAction::Wait(self.config.retire_wait()),
            ),
        };

        debug!(group = %self.group, ?action, next = ?next, "refresh step");
        self.phase = next;
        Some(action)
    }

    /// Abort the refresh. Later `advance` calls return `None`.
    pub fn fail(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(group = %self.group, %reason, "group refresh failed");
        self.phase = RefreshPhase::Failed { reason };
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, RefreshPhase::Completed | RefreshPhase::Failed { .. })
    }
}
