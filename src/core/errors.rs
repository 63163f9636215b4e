/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Terminal reason reported by a cancelled [`Context`](crate::Context)
#[derive(Error, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Diagnostic)]
#[serde(rename_all = "snake_case")]
pub enum ContextError {
    #[error("context canceled")]
    #[diagnostic(
        code(context::canceled),
        help("The context was cancelled through its CancelHandle or a parent context.")
    )]
    Canceled,

    #[error("context deadline exceeded")]
    #[diagnostic(
        code(context::deadline_exceeded),
        help("The context deadline passed before the operation completed.")
    )]
    DeadlineExceeded,
}

/// Condition variable errors with serialization support
///
/// Cancellation of a supplied context is the only failure a condition
/// variable can report; everything else (including use after close) is
/// defined behaviour.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum CondError {
    #[error("wait interrupted: {0}")]
    #[diagnostic(
        code(cond::wait_interrupted),
        help("The context was cancelled before any signal, broadcast or close reached this waiter. The lock has been reacquired.")
    )]
    Interrupted(ContextError),

    #[error("signal interrupted after waking {woken} waiter(s): {cause}")]
    #[diagnostic(
        code(cond::signal_interrupted),
        help("Fewer waiters registered than requested before the context was cancelled.")
    )]
    SignalInterrupted { woken: usize, cause: ContextError },

    #[error("blocking task failed: {0}")]
    #[diagnostic(
        code(cond::join_failed),
        help("The blocking signal task panicked or its runtime shut down.")
    )]
    Join(String),
}

impl CondError {
    /// Number of waiters woken before the error occurred
    pub fn woken(&self) -> usize {
        match self {
            CondError::SignalInterrupted { woken, .. } => *woken,
            CondError::Interrupted(_) | CondError::Join(_) => 0,
        }
    }

    /// Context reason behind the error, if any
    pub fn cause(&self) -> Option<ContextError> {
        match self {
            CondError::Interrupted(cause) | CondError::SignalInterrupted { cause, .. } => {
                Some(*cause)
            }
            CondError::Join(_) => None,
        }
    }
}

impl From<ContextError> for CondError {
    fn from(err: ContextError) -> Self {
        CondError::Interrupted(err)
    }
}

/// Result type for condition variable operations
pub type CondResult<T> = Result<T, CondError>;
