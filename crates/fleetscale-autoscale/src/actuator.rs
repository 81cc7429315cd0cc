//! Actuator: turns scaling intents into fleet calls.

use std::sync::Arc;

use tracing::{error, info};

use fleetscale_fleet::{FleetError, FleetProvider};

use crate::intent::ScalingIntent;

/// What happened to a batch of intents.
#[derive(Debug, Default)]
pub struct ActuationReport {
    pub applied: usize,
    /// Intents skipped because of dry-run mode.
    pub skipped: usize,
    pub failed: Vec<(ScalingIntent, FleetError)>,
}

pub struct Actuator {
    fleet: Arc<dyn FleetProvider>,
    dry_run: bool,
}

impl Actuator {
    pub fn new(fleet: Arc<dyn FleetProvider>, dry_run: bool) -> Self {
        Self { fleet, dry_run }
    }

    /// Apply every intent in order. A failed intent is logged and the
    /// rest of the batch still runs.
    pub async fn apply(&self, intents: &[ScalingIntent]) -> ActuationReport {
        let mut report = ActuationReport::default();

        for intent in intents {
            if self.dry_run {
                info!(?intent, "dry run, not applying");
                report.skipped += 1;
                continue;
            }

            let result = match intent {
                ScalingIntent::ProvisionGroup { name, instance_type } => {
                    info!(group = %name, %instance_type, "creating managed group");
                    self.fleet.create_group(name, instance_type).await
                }
                ScalingIntent::RemoveNode { node_id } => {
                    info!(node = %node_id, "removing node");
                    self.fleet.delete_group_or_terminate(node_id).await
                }
            };

            match result {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    error!(?intent, error = %e, "scaling action failed");
                    report.failed.push((intent.clone(), e));
                }
            }
        }

        report
    }
}
