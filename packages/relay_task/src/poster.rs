//! Hand-off point between worker threads and the coordination context

use crate::TaskResult;
use std::fmt;
use std::sync::Arc;

/// A unit of work destined for the coordination context
pub type Action = Box<dyn FnOnce() + Send + 'static>;

/// Schedules actions onto a single coordination context
///
/// Implementations must uphold three guarantees that [`Task`](crate::Task)
/// relies on:
///
/// - every accepted action eventually runs on one logical executor, never
///   concurrently with another action from the same poster;
/// - actions run in the order `post` accepted them, across all calling threads;
/// - `post` never runs the action on the caller's thread.
pub trait CoordinationPoster: Send + Sync {
    /// Queue `action` for later execution on the coordination context
    ///
    /// # Errors
    ///
    /// Returns `TaskError::PosterClosed` if the coordination context has shut down.
    /// The action is dropped without running in that case.
    fn post(&self, action: Action) -> TaskResult<()>;
}

impl<P> CoordinationPoster for Arc<P>
where
    P: CoordinationPoster + ?Sized,
{
    fn post(&self, action: Action) -> TaskResult<()> {
        (**self).post(action)
    }
}

/// Adapts an external scheduling hook into a [`CoordinationPoster`]
///
/// Useful for GUI toolkits that expose an "invoke later" function. The hook
/// itself must honour the poster contract.
///
/// ```
/// use relay_task::{Action, FnPoster, TaskResult};
/// use std::sync::mpsc;
/// use std::sync::Mutex;
///
/// let (tx, rx) = mpsc::channel::<Action>();
/// let tx = Mutex::new(tx);
/// let poster = FnPoster::new(move |action: Action| -> TaskResult<()> {
///     tx.lock()
///         .map_err(|_| relay_task::TaskError::PosterClosed)?
///         .send(action)
///         .map_err(|_| relay_task::TaskError::PosterClosed)
/// });
/// # drop(poster);
/// # drop(rx);
/// ```
pub struct FnPoster<F> {
    hook: F,
}

impl<F> FnPoster<F>
where
    F: Fn(Action) -> TaskResult<()> + Send + Sync,
{
    /// Wrap a scheduling hook
    pub const fn new(hook: F) -> Self {
        Self { hook }
    }
}

impl<F> CoordinationPoster for FnPoster<F>
where
    F: Fn(Action) -> TaskResult<()> + Send + Sync,
{
    fn post(&self, action: Action) -> TaskResult<()> {
        (self.hook)(action)
    }
}

impl<F> fmt::Debug for FnPoster<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPoster").finish_non_exhaustive()
    }
}
