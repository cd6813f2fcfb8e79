//! Advisory cancellation signal shared between a task and its work unit

use crate::{TaskError, TaskResult};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Cooperative interruption flag
///
/// Raising the signal never stops anything by itself. Work units poll it with
/// [`check`](Self::check), sleep on it with [`sleep`](Self::sleep), or await
/// [`cancelled`](Self::cancelled) and return early when it fires. Waiters use
/// the same type to be interrupted out of a blocking wait.
///
/// Clones share one flag. Once raised it stays raised.
#[derive(Clone, Default)]
pub struct CancelSignal {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    token: CancellationToken,
    // Blocking sleepers park here; the token only wakes async waiters.
    sleep_lock: Mutex<()>,
    sleepers: Condvar,
}

impl CancelSignal {
    /// Create a signal that has not been raised
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal, waking blocked sleepers and async waiters
    ///
    /// Returns `true` if this call raised it, `false` if it was already raised.
    pub fn cancel(&self) -> bool {
        let guard = self.lock();
        if self.inner.token.is_cancelled() {
            return false;
        }
        self.inner.token.cancel();
        drop(guard);

        self.inner.sleepers.notify_all();
        true
    }

    /// Whether the signal has been raised
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Bail out of a work unit with `?` once the signal is raised
    ///
    /// # Errors
    ///
    /// Returns `TaskError::Cancelled` if the signal has been raised.
    pub fn check(&self) -> TaskResult<()> {
        if self.is_cancelled() {
            Err(TaskError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Block the current thread for `duration`, waking early on cancellation
    ///
    /// # Errors
    ///
    /// Returns `TaskError::Cancelled` if the signal is raised before or during the sleep.
    pub fn sleep(&self, duration: Duration) -> TaskResult<()> {
        let guard = self.lock();
        let (_guard, _timeout) = self
            .inner
            .sleepers
            .wait_timeout_while(guard, duration, |_| !self.inner.token.is_cancelled())
            .unwrap_or_else(PoisonError::into_inner);

        self.check()
    }

    /// Resolve once the signal is raised
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await;
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.inner.sleep_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for CancelSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelSignal")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
