// Error types for agent execution and orchestration

use thiserror::Error;

/// Failure modes of the execution core.
///
/// None of these are returned to callers of `execute` or the orchestrator
/// operations as `Err`; they are rendered into the `error` field of an
/// `ExecutionResult` or logged.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecutionError {
    /// Caller exceeded its request quota for the current window.
    #[error("Rate limit exceeded. Please try again later.")]
    RateLimitExceeded,

    /// No credentialed provider could serve the request.
    #[error("No model provider available")]
    NoProviderAvailable,

    /// The provider adapter failed.
    #[error("{0}")]
    ProviderCallFailed(#[from] agora_abstraction::ModelError),

    /// A circuit breaker refused the operation.
    #[error("Circuit breaker is open for '{key}'. Too many failures detected.")]
    CircuitOpen {
        /// The protected key (agent lineage, feedback chain or workflow).
        key: String,
    },

    /// Spawning would exceed the recursion ceiling.
    #[error("Maximum recursion depth ({max_depth}) exceeded.")]
    RecursionDepthExceeded {
        /// The configured ceiling.
        max_depth: u32,
    },

    /// Writing a usage record failed.
    #[error("Failed to record usage: {0}")]
    UsageRecordingFailed(String),
}

/// Errors raised while evaluating agents.
#[derive(Debug, Error)]
pub enum EvaluationError {
    /// The evaluation store rejected a write or read.
    #[error("Evaluation store error: {0}")]
    Store(String),
}

/// Errors from the background evaluation scheduler lifecycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// `start` was called while a schedule is active.
    #[error("Background evaluation is already running")]
    AlreadyRunning,

    /// `stop` was called with no active schedule.
    #[error("Background evaluation is not running")]
    NotRunning,
}
