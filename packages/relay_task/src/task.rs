//! Single-use background task with coordinated completion

use crate::{
    CancelSignal, CoordinationPoster, Outcome, TaskConfig, TaskError, TaskResult, TaskState,
};
use futures::future::{self, Either};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Work executed on the background thread
pub type WorkUnit<T> = Box<dyn FnOnce(&CancelSignal) -> TaskResult<T> + Send + 'static>;

type Completion<T> = Box<dyn FnOnce(Outcome<T>) + Send + 'static>;

/// Completion action paired with the poster that delivers it
struct Dispatch<T> {
    poster: Arc<dyn CoordinationPoster>,
    action: Completion<T>,
}

struct Progress<T> {
    state: TaskState,
    outcome: Option<Outcome<T>>,
}

struct Shared<T> {
    progress: watch::Sender<Progress<T>>,
    work: Mutex<Option<WorkUnit<T>>>,
    completion: Mutex<Option<Dispatch<T>>>,
    cancel: CancelSignal,
    config: TaskConfig,
}

/// Runs one unit of work on a dedicated thread and relays completion
///
/// A task is single-use: it is built, started once, and ends `Completed`.
/// The work unit receives the task's [`CancelSignal`] and may return early
/// once it is raised. When the work unit returns, its [`Outcome`] is stored
/// first and the completion action, if any, is posted to its
/// [`CoordinationPoster`] afterwards.
///
/// `Task` is a cheap handle; clones observe the same task.
///
/// ```
/// use relay_task::{event_loop, Task};
///
/// let (poster, mut ui) = event_loop();
/// let task = Task::builder(|_cancel| Ok(6 * 7))
///     .on_complete(poster, || println!("answer ready"))
///     .start()?;
///
/// assert_eq!(task.await_result(), Some(42));
/// ui.run_pending();
/// # Ok::<(), relay_task::TaskError>(())
/// ```
pub struct Task<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Task<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an unstarted task without a completion action
    pub fn new<F>(work: F) -> Self
    where
        F: FnOnce(&CancelSignal) -> TaskResult<T> + Send + 'static,
    {
        Self::builder(work).build()
    }

    /// Create an unstarted task from an infallible, signal-agnostic closure
    pub fn from_fn<F>(work: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Self::new(move |_| Ok(work()))
    }

    /// Start configuring a task around `work`
    pub fn builder<F>(work: F) -> TaskBuilder<T>
    where
        F: FnOnce(&CancelSignal) -> TaskResult<T> + Send + 'static,
    {
        TaskBuilder {
            work: Box::new(work),
            completion: None,
            config: TaskConfig::default(),
        }
    }

    /// Spawn the background thread that runs the work unit
    ///
    /// A task starts at most once. Later calls fail fast and leave the
    /// running work untouched.
    ///
    /// # Errors
    ///
    /// Returns `TaskError::AlreadyStarted` on every call after the first, or
    /// `TaskError::Spawn` if the OS refuses to create the thread. A spawn
    /// failure still completes the task with that error and posts its
    /// completion action.
    pub fn start(&self) -> TaskResult<()> {
        let Some(work) = lock(&self.shared.work).take() else {
            tracing::warn!(
                task = %self.name(),
                state = self.state().as_str(),
                "Ignoring repeated start"
            );
            return Err(TaskError::AlreadyStarted);
        };

        self.shared
            .progress
            .send_modify(|progress| progress.state = TaskState::Running);

        let shared = Arc::clone(&self.shared);
        let spawned = self
            .shared
            .config
            .thread_builder()
            .spawn(move || shared.run(work));

        match spawned {
            Ok(_detached) => {
                tracing::debug!(task = %self.name(), "Task started");
                Ok(())
            }
            Err(e) => {
                let error = TaskError::Spawn(e.to_string());
                tracing::error!(task = %self.name(), %error, "Could not start task");
                self.shared.finish(Outcome::Failed(error.clone()));
                Err(error)
            }
        }
    }

    /// Ask the work unit to stop and release waiters
    ///
    /// Only a running task is affected: its [`CancelSignal`] is raised and it
    /// moves to [`TaskState::Cancelling`], so pending and future waits return
    /// without waiting for the work unit. The work unit keeps running until it
    /// notices the signal (or finishes anyway); whatever it returns is still
    /// stored and the completion action still runs. Calling this on a task that
    /// has not started or has completed does nothing.
    pub fn cancel(&self) {
        let released = self.shared.progress.send_if_modified(|progress| {
            if progress.state.is_live() {
                progress.state = TaskState::Cancelling;
                true
            } else {
                false
            }
        });

        if released {
            self.shared.cancel.cancel();
            tracing::debug!(task = %self.name(), "Task cancellation requested");
        }
    }

    /// Wait until the task is no longer running, then return its outcome
    ///
    /// Resolves immediately for a task that never started, was cancelled, or
    /// already completed. `None` means no outcome has been produced yet.
    pub async fn join(&self) -> Option<Outcome<T>> {
        let mut receiver = self.shared.progress.subscribe();
        let outcome = match receiver.wait_for(|progress| !progress.state.is_live()).await {
            Ok(progress) => progress.outcome.clone(),
            // The sender lives in `shared`, which this handle keeps alive.
            Err(_) => self.outcome(),
        };
        outcome
    }

    /// Block the current thread until the task is no longer running
    ///
    /// Must not be called from inside an async runtime worker; use
    /// [`join`](Self::join) there.
    #[must_use]
    pub fn await_outcome(&self) -> Option<Outcome<T>> {
        tracing::trace!(task = %self.name(), "Waiting for task");
        futures::executor::block_on(self.join())
    }

    /// Block until the task is no longer running, then return its value
    ///
    /// `None` if the work unit failed, was cancelled before producing a value,
    /// or has not run.
    #[must_use]
    pub fn await_result(&self) -> Option<T> {
        self.await_outcome().and_then(Outcome::into_value)
    }

    /// Block like [`await_outcome`](Self::await_outcome), but give up when
    /// `interrupt` is raised
    ///
    /// The interrupt stays raised so the caller's own context still sees it.
    ///
    /// # Errors
    ///
    /// Returns `TaskError::Interrupted` if `interrupt` fires while the task is running.
    pub fn wait_interruptible(&self, interrupt: &CancelSignal) -> TaskResult<Option<Outcome<T>>> {
        futures::executor::block_on(async {
            let joined = pin!(self.join());
            let interrupted = pin!(interrupt.cancelled());
            match future::select(joined, interrupted).await {
                Either::Left((outcome, _)) => Ok(outcome),
                Either::Right(((), _)) => {
                    tracing::debug!(task = %self.name(), "Wait interrupted");
                    Err(TaskError::Interrupted)
                }
            }
        })
    }

    /// Block for the value, returning `None` at once if `interrupt` is raised
    #[must_use]
    pub fn await_result_interruptible(&self, interrupt: &CancelSignal) -> Option<T> {
        self.wait_interruptible(interrupt)
            .ok()
            .flatten()
            .and_then(Outcome::into_value)
    }

    /// Peek at the produced value without blocking
    #[must_use]
    pub fn result(&self) -> Option<T> {
        self.shared
            .progress
            .borrow()
            .outcome
            .as_ref()
            .and_then(Outcome::value)
            .cloned()
    }

    /// Peek at the tagged outcome without blocking
    #[must_use]
    pub fn outcome(&self) -> Option<Outcome<T>> {
        self.shared.progress.borrow().outcome.clone()
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.shared.progress.borrow().state
    }

    /// Whether a background thread is live and not cancelled
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state().is_live()
    }

    /// The signal handed to the work unit
    #[must_use]
    pub fn cancel_signal(&self) -> CancelSignal {
        self.shared.cancel.clone()
    }

    /// Worker thread name, also used to label log events
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.config.thread_name
    }
}

impl Task<()> {
    /// Run `work` in the background and `completion` on the coordination context
    ///
    /// Builds and starts a fresh task in one call.
    ///
    /// # Errors
    ///
    /// Returns `TaskError::Spawn` if the worker thread cannot be created.
    pub fn spawn<P, W, C>(poster: P, work: W, completion: C) -> TaskResult<Self>
    where
        P: CoordinationPoster + 'static,
        W: FnOnce() + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        Self::builder(move |_| {
            work();
            Ok(())
        })
        .on_complete(poster, completion)
        .start()
    }
}

impl<T> Shared<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn run(&self, work: WorkUnit<T>) {
        let outcome = if self.cancel.is_cancelled() {
            tracing::debug!(task = %self.config.thread_name, "Cancelled before work began");
            Outcome::Cancelled
        } else {
            match panic::catch_unwind(AssertUnwindSafe(|| work(&self.cancel))) {
                Ok(result) => Outcome::from_work(result),
                Err(payload) => Outcome::Failed(TaskError::panicked(payload.as_ref())),
            }
        };

        if let Outcome::Failed(error) = &outcome {
            tracing::error!(task = %self.config.thread_name, %error, "Work unit failed");
        }
        self.finish(outcome);
    }

    /// Publish the outcome, then hand the completion action to its poster
    fn finish(&self, outcome: Outcome<T>) {
        let stored = outcome.clone();
        self.progress.send_modify(move |progress| {
            progress.outcome = Some(stored);
            progress.state = TaskState::Completed;
        });

        let Some(Dispatch { poster, action }) = lock(&self.completion).take() else {
            return;
        };
        tracing::debug!(task = %self.config.thread_name, "Posting completion action");
        if let Err(error) = poster.post(Box::new(move || action(outcome))) {
            tracing::warn!(task = %self.config.thread_name, %error, "Completion action dropped");
        }
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.shared.config.thread_name)
            .field("state", &self.shared.progress.borrow().state)
            .finish_non_exhaustive()
    }
}

/// Configures a [`Task`] before it is built or started
pub struct TaskBuilder<T> {
    work: WorkUnit<T>,
    completion: Option<Dispatch<T>>,
    config: TaskConfig,
}

impl<T> TaskBuilder<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Replace the worker thread configuration
    #[must_use]
    pub fn config(mut self, config: TaskConfig) -> Self {
        self.config = config;
        self
    }

    /// Name the worker thread
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = name.into();
        self
    }

    /// Run `action` on `poster`'s coordination context once the work unit returns
    #[must_use]
    pub fn on_complete<P, C>(self, poster: P, action: C) -> Self
    where
        P: CoordinationPoster + 'static,
        C: FnOnce() + Send + 'static,
    {
        self.on_outcome(poster, move |_| action())
    }

    /// Like [`on_complete`](Self::on_complete), but the action receives the outcome
    #[must_use]
    pub fn on_outcome<P, C>(mut self, poster: P, action: C) -> Self
    where
        P: CoordinationPoster + 'static,
        C: FnOnce(Outcome<T>) + Send + 'static,
    {
        self.completion = Some(Dispatch {
            poster: Arc::new(poster),
            action: Box::new(action),
        });
        self
    }

    /// Build the task without starting it
    #[must_use]
    pub fn build(self) -> Task<T> {
        let (progress, _) = watch::channel(Progress {
            state: TaskState::NotStarted,
            outcome: None,
        });

        Task {
            shared: Arc::new(Shared {
                progress,
                work: Mutex::new(Some(self.work)),
                completion: Mutex::new(self.completion),
                cancel: CancelSignal::new(),
                config: self.config,
            }),
        }
    }

    /// Build the task and start it
    ///
    /// # Errors
    ///
    /// Returns `TaskError::Spawn` if the worker thread cannot be created.
    pub fn start(self) -> TaskResult<Task<T>> {
        let task = self.build();
        task.start()?;
        Ok(task)
    }
}

fn lock<G>(mutex: &Mutex<G>) -> MutexGuard<'_, G> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
