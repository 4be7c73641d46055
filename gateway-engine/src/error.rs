//! Tagged error taxonomy for the execution engine.
//!
//! Each variant corresponds to one row of the error taxonomy table: kind,
//! retryability, and how the HTTP layer should present it are all implied
//! by the variant itself rather than by ad-hoc string matching.

use std::fmt;

/// Errors the engine can return from `Execute`.
///
/// `SpawnFailed` and `Timeout` are not returned here — they are folded into
/// a normal [`crate::types::ExecutionResult`] instead, since the spec treats
/// them as results of a program run rather than engine-level failures.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unsupported language: {0}")]
    Unsupported(String),

    #[error("source exceeds maximum size of {max} bytes (got {actual})")]
    InputTooLarge { max: usize, actual: usize },

    #[error("engine at capacity ({active}/{max_concurrent} in flight)")]
    Capacity { active: usize, max_concurrent: usize },

    #[error("circuit open for {language}, retry after {retry_after_secs}s")]
    CircuitOpen {
        language: String,
        retry_after_secs: u64,
    },

    #[error("source rejected by security policy: {0}")]
    PolicyRejected(String),
}

impl EngineError {
    /// Whether a caller may reasonably retry this exact request.
    pub fn retryable(&self) -> bool {
        matches!(self, EngineError::Capacity { .. } | EngineError::CircuitOpen { .. })
    }

    /// Suggested `Retry-After` value in seconds, if any.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            EngineError::Capacity { .. } => Some(5),
            EngineError::CircuitOpen { retry_after_secs, .. } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

/// Short machine-readable kind, stable across error message wording changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unsupported,
    InputTooLarge,
    Capacity,
    CircuitOpen,
    PolicyRejected,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::InputTooLarge => "input-too-large",
            ErrorKind::Capacity => "capacity",
            ErrorKind::CircuitOpen => "circuit-open",
            ErrorKind::PolicyRejected => "policy-rejected",
        };
        f.write_str(s)
    }
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Unsupported(_) => ErrorKind::Unsupported,
            EngineError::InputTooLarge { .. } => ErrorKind::InputTooLarge,
            EngineError::Capacity { .. } => ErrorKind::Capacity,
            EngineError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            EngineError::PolicyRejected(_) => ErrorKind::PolicyRejected,
        }
    }
}
