//! Fleet refresher: drives group refreshes against a fleet provider.
//!
//! Groups are refreshed one at a time. Each step blocks for its fixed
//! window; there is no health polling and no retry. A failure on one
//! group is logged and the pass moves on to the next.

use std::sync::Arc;

use tracing::{debug, error, info};

use fleetscale_fleet::{FleetProvider, FleetResult};

use crate::config::RefreshConfig;
use crate::controller::{GroupRefresh, RefreshAction, RefreshPhase};

/// Outcome of one refresh pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Groups that went through a full cycle.
    pub refreshed: Vec<String>,
    /// Groups whose refresh failed, with the reason.
    pub failed: Vec<(String, String)>,
    /// Groups already running the latest launch version.
    pub up_to_date: usize,
}

pub struct FleetRefresher {
    fleet: Arc<dyn FleetProvider>,
    config: RefreshConfig,
}

impl FleetRefresher {
    pub fn new(fleet: Arc<dyn FleetProvider>, config: RefreshConfig) -> Self {
        Self { fleet, config }
    }

    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    /// Refresh every stale managed group.
    ///
    /// Only the initial group listing can fail the pass.
    pub async fn refresh_all(&self) -> FleetResult<RefreshReport> {
        let groups = self.fleet.list_managed_groups().await?;
        debug!(groups = groups.len(), "checking managed groups for stale members");

        let mut report = RefreshReport::default();
        for group in &groups {
            let latest = match self.fleet.latest_launch_version(group).await {
                Ok(v) => v,
                Err(e) => {
                    error!(group = %group.name, error = %e, "cannot read latest launch version");
                    report.failed.push((group.name.clone(), e.to_string()));
                    continue;
                }
            };

            if !group.is_stale(&latest) {
                report.up_to_date += 1;
                continue;
            }

            let stale: Vec<&str> = group
                .stale_members(&latest)
                .map(|m| m.instance_id.as_str())
                .collect();
            info!(
                group = %group.name,
                latest_version = %latest,
                stale = ?stale,
                "group has members on an old launch version"
            );

            let mut refresh = GroupRefresh::new(group, &latest, self.config.clone());
            self.drive(&mut refresh).await;

            match &refresh.phase {
                RefreshPhase::Failed { reason } => {
                    report.failed.push((group.name.clone(), reason.clone()));
                }
                _ => {
                    info!(group = %group.name, "group refreshed");
                    report.refreshed.push(group.name.clone());
                }
            }
        }

        Ok(report)
    }

    /// Run `refresh` to completion, executing each action in turn.
    pub async fn drive(&self, refresh: &mut GroupRefresh) {
        refresh.start();
        while let Some(action) = refresh.advance() {
            if let Err(e) = self.execute(&refresh.group, &action).await {
                refresh.fail(format!("{action:?}: {e}"));
                return;
            }
        }
    }

    async fn execute(&self, group: &str, action: &RefreshAction) -> FleetResult<()> {
        match action {
            RefreshAction::Wait(d) => {
                debug!(%group, secs = d.as_secs(), "waiting");
                tokio::time::sleep(*d).await;
                Ok(())
            }
            _ if self.config.dry_run => {
                info!(%group, ?action, "dry run, skipping fleet mutation");
                Ok(())
            }
            RefreshAction::SetMaxCapacity(max) => self.fleet.set_max_capacity(group, *max).await,
            RefreshAction::SetDesiredCapacity(desired) => {
                self.fleet.set_desired_capacity(group, *desired).await
            }
        }
    }
}
