//! Errors in the library.
use thiserror::Error;

/// Errors raised by components of the library.
#[derive(Debug, Error)]
pub enum AnakinError {
    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Record value type error.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),

    /// Invalid configuration, detected before any training work starts.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A replica contributed a value whose structure differs from the others.
    #[error("Reduction shape mismatch at replica {replica}: {detail}")]
    ReductionShapeMismatch {
        /// Index of the offending replica.
        replica: usize,
        /// Description of the mismatch.
        detail: String,
    },

    /// A replica left the reduction barrier before the update step completed.
    #[error("Replica disconnected from the reduction barrier")]
    ReplicaDisconnected,
}
