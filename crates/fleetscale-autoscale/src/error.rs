//! Error types for the autoscaler.

use fleetscale_fleet::FleetError;
use fleetscale_state::StateError;
use thiserror::Error;

pub type ScaleResult<T> = Result<T, ScaleError>;

#[derive(Debug, Error)]
pub enum ScaleError {
    /// Cluster state could not be read. Aborts the iteration.
    #[error("cluster state unavailable: {0}")]
    State(#[from] StateError),

    #[error("fleet operation failed: {0}")]
    Fleet(#[from] FleetError),

    #[error("invalid scaling policy: {0}")]
    InvalidPolicy(String),
}
