//! Error taxonomy for the routing core.
//!
//! Every fallible operation in the crate returns [`DispatchError`]. The
//! resilience layer decides retry behavior from [`DispatchError::classify`],
//! so new variants must be slotted into an [`ErrorCategory`] deliberately
//! rather than defaulting to fatal.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the routing core and its collaborators.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A collaborator call failed in a way that is expected to succeed on
    /// retry (network timeout, 5xx, connection reset).
    #[error("transient failure talking to {dependency}: {message}")]
    Transient {
        /// Name of the dependency that failed.
        dependency: &'static str,
        /// Description from the underlying call.
        message: String,
    },

    /// The collaborator reported an explicit rate limit with a reset time.
    #[error("rate limited by {dependency}, reset in {reset_after:?}")]
    RateLimited {
        /// Name of the dependency that throttled us.
        dependency: &'static str,
        /// Time until the limit resets, as reported by the collaborator.
        reset_after: Duration,
    },

    /// A write (comment, label, merge) failed after it may have partially
    /// completed. Must not be blindly retried.
    #[error("write to {dependency} may have partially completed: {message}")]
    AmbiguousWrite {
        /// Name of the dependency the write targeted.
        dependency: &'static str,
        /// Description of the ambiguous outcome.
        message: String,
    },

    /// The circuit breaker for a dependency is open; the call was rejected
    /// without any network attempt.
    #[error("circuit open for {dependency}, retry after {retry_after:?}")]
    CircuitOpen {
        /// Name of the dependency whose breaker is open.
        dependency: &'static str,
        /// Remaining cooldown before a trial call is permitted.
        retry_after: Duration,
    },

    /// Another holder owns a non-expired lease on the work item.
    #[error("work item {work_item} is held by {holder}")]
    Busy {
        /// The contested work item id.
        work_item: String,
        /// Identity of the current lease holder.
        holder: String,
    },

    /// Retries exhausted against a dependency.
    #[error("retries exhausted against {dependency} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Name of the dependency.
        dependency: &'static str,
        /// Number of attempts made.
        attempts: u32,
        /// The final error message observed.
        last_error: String,
    },

    /// The execution agent exceeded its overall wall-clock ceiling.
    #[error("execution exceeded ceiling of {ceiling:?}")]
    ExecutionTimeout {
        /// The configured ceiling.
        ceiling: Duration,
    },

    /// The run was cancelled by an external signal.
    ///
    /// The field is deliberately not named `source`: thiserror would treat
    /// it as the error's source and require it to implement `Error`.
    #[error("cancelled by {origin}")]
    Cancelled {
        /// Where the cancellation came from.
        origin: String,
    },

    /// An unrecoverable failure; the work item transitions to Aborted.
    #[error("fatal: {0}")]
    Fatal(String),
}

/// Coarse category used by the resilience layer and the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Safe to retry under the configured policy.
    Transient,
    /// Retryable, but only after the reported reset time.
    RateLimited,
    /// Must not be retried without confirmation.
    WriteAmbiguity,
    /// Non-fatal contention; caller decides whether to come back later.
    Busy,
    /// Terminal; surfaces outside the core.
    Fatal,
}

impl DispatchError {
    /// Classify this error into the category that drives retry behavior.
    pub fn classify(&self) -> ErrorCategory {
        match self {
            DispatchError::Transient { .. } => ErrorCategory::Transient,
            DispatchError::RateLimited { .. } => ErrorCategory::RateLimited,
            DispatchError::AmbiguousWrite { .. } => ErrorCategory::WriteAmbiguity,
            DispatchError::Busy { .. } => ErrorCategory::Busy,
            DispatchError::CircuitOpen { .. }
            | DispatchError::RetriesExhausted { .. }
            | DispatchError::ExecutionTimeout { .. }
            | DispatchError::Cancelled { .. }
            | DispatchError::Fatal(_) => ErrorCategory::Fatal,
        }
    }

    /// True when the resilience layer may retry this error on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.classify(),
            ErrorCategory::Transient | ErrorCategory::RateLimited
        )
    }
}

/// Convert an error category into a stable audit-trail label.
pub fn error_category_label(category: &ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::Transient => "transient",
        ErrorCategory::RateLimited => "rate_limited",
        ErrorCategory::WriteAmbiguity => "write_ambiguity",
        ErrorCategory::Busy => "busy",
        ErrorCategory::Fatal => "fatal",
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, DispatchError>;
