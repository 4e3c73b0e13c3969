//! Error types for the triage core.

use uuid::Uuid;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    #[error("Trace error: {0}")]
    Trace(#[from] TraceError),
}

/// Email source errors. Any of these is fatal to the pipeline call that
/// triggered the fetch; there is no partial-result path out of the fetch
/// stage, and no retry inside this core.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("source unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("source authentication failed: {reason}")]
    AuthFailed { reason: String },
}

/// Summarization oracle errors. Recovered locally: a failed batch degrades
/// to per-item escalation placeholders, never an aborted pipeline.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("batch summarization failed: {reason}")]
    BatchFailed { reason: String },

    #[error("invalid oracle response: {reason}")]
    InvalidResponse { reason: String },
}

/// Action execution errors. Recovered locally: the failing item is recorded
/// with a failed status and the pipeline continues.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("action execution failed for email {email_id}: {reason}")]
    ExecutionFailed { email_id: String, reason: String },

    #[error("unsupported action '{action}' for email {email_id}")]
    Unsupported { email_id: String, action: String },
}

/// Trace lifecycle errors. These indicate caller bugs and are always
/// surfaced, never absorbed.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("trace {trace_id} is sealed, cannot {operation}")]
    InvalidState { trace_id: Uuid, operation: String },

    #[error("trace {trace_id} not found")]
    NotFound { trace_id: Uuid },
}

/// Errors surfaced by `process_inbox`. Everything else that goes wrong
/// during a run is absorbed into the `PipelineResult`.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("email source unavailable: {0}")]
    SourceUnavailable(#[from] SourceError),

    #[error("invalid session: {reason}")]
    InvalidSession { reason: String },
}

/// Result type alias for the triage core.
pub type Result<T> = std::result::Result<T, Error>;
