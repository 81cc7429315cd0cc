//! Scaling policy: thresholds and loop timing, fixed for the process lifetime.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use fleetscale_state::ResourceKind;

use crate::error::{ScaleError, ScaleResult};

/// Default conversion between scheduler CPU shares and vCPUs.
///
/// An approximation of how the scheduler derives shares from core count
/// and clock speed. Recalibrate for fleets with different CPU generations.
pub const DEFAULT_CPU_SHARES_PER_CORE: u64 = 2000;

/// Immutable autoscaler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingPolicy {
    /// Only nodes and blocked work in this datacenter are considered.
    pub datacenter: String,
    pub scale_up_cpu_util: f64,
    pub scale_up_mem_util: f64,
    pub scale_down_cpu_util: f64,
    pub scale_down_mem_util: f64,
    /// Maximum nodes removed per iteration.
    pub scale_down_step: usize,
    /// Run the whole decision path but skip fleet mutations.
    pub dry_run: bool,
    pub cpu_shares_per_core: u64,
    /// Pause after an iteration that acted.
    pub scale_up_cooldown_secs: u64,
    /// Pause after an iteration that did nothing.
    pub idle_interval_secs: u64,
}

impl Default for ScalingPolicy {
    fn default() -> Self {
        Self {
            datacenter: "dc1".to_string(),
            scale_up_cpu_util: 0.9,
            scale_up_mem_util: 0.9,
            scale_down_cpu_util: 0.9,
            scale_down_mem_util: 0.9,
            scale_down_step: 1,
            dry_run: false,
            cpu_shares_per_core: DEFAULT_CPU_SHARES_PER_CORE,
            scale_up_cooldown_secs: 300,
            idle_interval_secs: 60,
        }
    }
}

impl ScalingPolicy {
    /// Check the policy once at startup.
    pub fn validate(&self) -> ScaleResult<()> {
        let thresholds = [
            ("scale_up_cpu_util", self.scale_up_cpu_util),
            ("scale_up_mem_util", self.scale_up_mem_util),
            ("scale_down_cpu_util", self.scale_down_cpu_util),
            ("scale_down_mem_util", self.scale_down_mem_util),
        ];
        for (name, value) in thresholds {
            if !(0.0..=1.0).contains(&value) {
                return Err(ScaleError::InvalidPolicy(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.scale_down_step == 0 {
            return Err(ScaleError::InvalidPolicy(
                "scale_down_step must be at least 1".to_string(),
            ));
        }
        if self.cpu_shares_per_core == 0 {
            return Err(ScaleError::InvalidPolicy(
                "cpu_shares_per_core must be positive".to_string(),
            ));
        }
        if self.datacenter.is_empty() {
            return Err(ScaleError::InvalidPolicy("datacenter is empty".to_string()));
        }
        Ok(())
    }

    /// Midpoint of a resource's scale-up and scale-down thresholds.
    pub fn median_util(&self, kind: ResourceKind) -> f64 {
        match kind {
            ResourceKind::Cpu => (self.scale_up_cpu_util + self.scale_down_cpu_util) / 2.0,
            ResourceKind::Memory => (self.scale_up_mem_util + self.scale_down_mem_util) / 2.0,
        }
    }

    pub fn scale_up_cooldown(&self) -> Duration {
        Duration::from_secs(self.scale_up_cooldown_secs)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_interval_secs)
    }
}
