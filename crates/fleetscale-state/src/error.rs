//! Error types for cluster state reads.

use thiserror::Error;

/// Result type alias for state provider operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur while reading cluster state.
///
/// Every variant aborts the current control-loop iteration; none of them
/// is fatal to the process.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state provider unreachable at {endpoint}: {reason}")]
    Unavailable { endpoint: String, reason: String },

    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("malformed response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("invalid state provider config: {0}")]
    Config(String),
}
