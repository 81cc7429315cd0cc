//! fleetscale-rollout: rolling replacement of stale fleet members.
//!
//! Managed groups whose members were launched from an older launch
//! template version are refreshed by surging one new member, waiting,
//! then dropping desired capacity back so the oldest member retires.
//!
//! # Components
//!
//! - **`config`**: refresh timing and dry-run flag
//! - **`controller`**: per-group refresh state machine
//! - **`refresher`**: runs refreshes against a `FleetProvider`

pub mod config;
pub mod controller;
pub mod refresher;

pub use config::RefreshConfig;
pub use controller::{GroupRefresh, RefreshAction, RefreshPhase};
pub use refresher::{FleetRefresher, RefreshReport};
