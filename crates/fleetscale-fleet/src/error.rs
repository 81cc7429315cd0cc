//! Error types for fleet mutations and queries.

use thiserror::Error;

/// Result type alias for fleet provider operations.
pub type FleetResult<T> = Result<T, FleetError>;

/// Errors returned by a [`FleetProvider`](crate::FleetProvider).
///
/// The control loop logs these per intent and carries on with the rest of
/// the batch.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("{operation} failed: {reason}")]
    Api { operation: String, reason: String },

    #[error("not found: {0}")]
    NotFound(String),
}

impl FleetError {
    pub fn api(operation: &str, reason: impl ToString) -> Self {
        Self::Api {
            operation: operation.to_string(),
            reason: reason.to_string(),
        }
    }
}
