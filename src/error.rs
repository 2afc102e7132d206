//! Library error types.

use thiserror::Error;

/// Structurally invalid selection policy. Raised when the policy is
/// constructed, never during selection.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PolicyError {
    #[error("Unknown selection profile: {0}")]
    UnknownProfile(String),

    #[error("Target total must be at least 1")]
    ZeroTarget,

    #[error("Minimum total {minimum} exceeds target total {target}")]
    MinimumExceedsTarget { minimum: usize, target: usize },

    #[error("Quality floor {0} is outside [0, 1]")]
    QualityFloorOutOfRange(f64),

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: f64 },

    #[error("Relaxed staypoint cap {relaxed:?} is stricter than {strict:?}")]
    RelaxedCapTooStrict {
        strict: Option<usize>,
        relaxed: Option<usize>,
    },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No home configured and none could be inferred from {media} media")]
    NoHome { media: usize },

    #[error(transparent)]
    Policy(#[from] PolicyError),
}
