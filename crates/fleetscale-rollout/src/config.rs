//! Fleet refresh configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing of the surge-then-retire refresh protocol.
///
/// Both waits are fixed windows calibrated for EC2 instance boot and
/// scheduler registration time, not health polls. Recalibrate per
/// deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Seconds to wait after adding the replacement member.
    pub surge_wait_secs: u64,
    /// Seconds to wait after dropping desired capacity back.
    pub retire_wait_secs: u64,
    /// Skip every fleet mutation, keeping logs and waits.
    pub dry_run: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            surge_wait_secs: 120,
            retire_wait_secs: 120,
            dry_run: false,
        }
    }
}

impl RefreshConfig {
    pub fn surge_wait(&self) -> Duration {
        Duration::from_secs(self.surge_wait_secs)
    }

    pub fn retire_wait(&self) -> Duration {
        Duration::from_secs(self.retire_wait_secs)
    }
}
