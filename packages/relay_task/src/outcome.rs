//! Terminal outcome and lifecycle state of a task

use crate::{TaskError, TaskResult};

/// Lifecycle of a task
///
/// Transitions only move forward: `NotStarted -> Running -> Completed`, with
/// `Cancelling` between the last two when cancellation arrives while the work
/// unit is still executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Built but `start` has not been called.
    NotStarted,
    /// The background thread is executing the work unit.
    Running,
    /// Cancellation was requested; the work unit has not returned yet.
    Cancelling,
    /// The work unit returned (or was skipped) and the outcome is final.
    Completed,
}

impl TaskState {
    /// Whether a background thread is live and not yet released by `cancel`
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Whether the work unit has produced its final outcome
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Stable lowercase name for log fields
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Running => "running",
            Self::Cancelling => "cancelling",
            Self::Completed => "completed",
        }
    }
}

/// Tagged terminal value of a work unit
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    /// The work unit returned a value.
    Success(T),
    /// The work unit returned an error or panicked.
    Failed(TaskError),
    /// Cancellation was honoured before a value was produced.
    Cancelled,
}

impl<T> Outcome<T> {
    /// Classify what a work unit handed back
    pub(crate) fn from_work(result: TaskResult<T>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(TaskError::Cancelled) => Self::Cancelled,
            Err(err) => Self::Failed(err),
        }
    }

    /// Borrow the produced value, if any
    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failed(_) | Self::Cancelled => None,
        }
    }

    /// Take the produced value, discarding failure details
    #[must_use]
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failed(_) | Self::Cancelled => None,
        }
    }

    /// Convert into a `Result`, mapping cancellation to `TaskError::Cancelled`
    ///
    /// # Errors
    ///
    /// Returns the captured failure, or `TaskError::Cancelled` for a cancelled task.
    pub fn into_result(self) -> TaskResult<T> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failed(err) => Err(err),
            Self::Cancelled => Err(TaskError::Cancelled),
        }
    }

    /// Whether the work unit produced a value
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Whether the work unit failed
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Whether cancellation won
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
