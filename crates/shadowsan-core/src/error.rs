//! Error types for recoverable configuration failures.

use thiserror::Error;

/// Rejected `SHADOWSAN_OPTIONS` content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlagError {
    #[error("option `{token}` is not of the form key=value")]
    Malformed { token: String },
    #[error("unknown flag `{key}`")]
    UnknownFlag { key: String },
    #[error("flag `{key}` has invalid value `{value}`")]
    InvalidValue { key: String, value: String },
    #[error("granularity {bytes} must be a power of two in 8..=128")]
    InvalidGranularity { bytes: usize },
    #[error("redzone {bytes} must be a power of two and at least {min}")]
    InvalidRedzone { bytes: usize, min: usize },
    #[error("redzone {redzone} is smaller than granularity {granularity}")]
    RedzoneBelowGranularity { redzone: usize, granularity: usize },
}
