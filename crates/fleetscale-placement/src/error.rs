//! Placement error types.

use thiserror::Error;

/// Errors raised while loading placement inputs.
#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("failed to read instance catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse instance catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid instance catalog: {0}")]
    Catalog(String),
}

pub type PlacementResult<T> = Result<T, PlacementError>;
