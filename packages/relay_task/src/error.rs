//! Error types for task execution and coordination

use std::any::Any;
use std::error::Error as StdError;
use std::sync::Arc;

/// Error types for background task operations
///
/// Cloneable so a single terminal failure can be handed to every reader of a
/// task's outcome.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskError {
    /// The work unit returned an error.
    #[error("Work unit failed: {0}")]
    WorkFailed(Arc<dyn StdError + Send + Sync>),
    /// The work unit panicked.
    #[error("Work unit panicked: {0}")]
    Panicked(String),
    /// Cancellation was observed before a result was produced.
    #[error("Task was cancelled")]
    Cancelled,
    /// The waiting context was interrupted.
    #[error("Wait was interrupted")]
    Interrupted,
    /// `start` was called on a task that already left the not-started state.
    #[error("Task already started")]
    AlreadyStarted,
    /// The background thread could not be created.
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(String),
    /// The coordination context no longer accepts actions.
    #[error("Coordination context closed")]
    PosterClosed,
}

impl TaskError {
    /// Wrap an arbitrary error raised by a work unit
    pub fn failed<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::WorkFailed(Arc::new(error))
    }

    /// Build a failure from a panic payload caught on the worker thread
    #[must_use]
    pub fn panicked(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(msg) = payload.downcast_ref::<&'static str>() {
            (*msg).to_string()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked(message)
    }

    /// Whether this error represents cancellation rather than failure
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type for task operations
pub type TaskResult<T> = Result<T, TaskError>;
