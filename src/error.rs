//! Error types for the decision engine.
//!
//! All errors are strongly typed using thiserror. The taxonomy mirrors the
//! engine's boundaries: `ValidationError` for rejected inputs,
//! `ExecutionError` for pipeline and store failures, `WorkerError` for the
//! background-worker channel. The orchestrator itself never lets any of these
//! escape to its caller; see `DecisionEngine::process_update`.

use thiserror::Error;

/// Validation errors that occur during input validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Confidence value {value} is out of range [0.0, 1.0]")]
    ConfidenceOutOfRange {
        value: f32,
    },

    #[error("Field name cannot be empty")]
    EmptyFieldName,

    #[error("Rule id cannot be empty")]
    EmptyRuleId,

    #[error("Phase name cannot be empty")]
    EmptyPhase,

    #[error("Invalid decision tree '{name}': {reason}")]
    InvalidTree {
        name: String,
        reason: String,
    },
}

/// Execution errors that occur while running the pipeline.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Store error: {message}")]
    Store {
        message: String,
    },

    #[error("Form context for session {session} expired at {expired_at}")]
    ContextExpired {
        session: String,
        expired_at: String,
    },

    #[error("Serialization failed: {message}")]
    Serialization {
        message: String,
    },
}

/// Errors at the background-worker boundary.
///
/// These never surface past the dispatch helper: a failed worker submission
/// or reply falls back to in-process execution.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Worker queue is full (capacity {capacity})")]
    QueueFull {
        capacity: usize,
    },

    #[error("Worker channel disconnected")]
    Disconnected,

    #[error("Worker reported failure: {message}")]
    Remote {
        message: String,
    },

    #[error("Timed out waiting for worker reply after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },
}

/// Top-level error type for the decision engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl EngineError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is a worker error.
    #[must_use]
    pub const fn is_worker(&self) -> bool {
        matches!(self, Self::Worker(_))
    }

    /// Returns true if the failed operation may succeed when retried.
    ///
    /// Validation errors never change on retry. Worker queue pressure and
    /// timeouts do.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::Execution(_) => false,
            Self::Worker(e) => matches!(
                e,
                WorkerError::QueueFull { .. } | WorkerError::Timeout { .. }
            ),
            Self::Internal { .. } => false,
        }
    }
}

impl From<crate::store::StoreError> for EngineError {
    fn from(err: crate::store::StoreError) -> Self {
        Self::Execution(ExecutionError::Store {
            message: err.to_string(),
        })
    }
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
