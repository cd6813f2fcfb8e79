//! Queue-backed coordination context
//!
//! [`event_loop`] pairs a cloneable [`LoopPoster`] with the [`EventLoop`] that
//! drains it. Whoever drives the `EventLoop` owns the coordination context:
//! a dedicated thread via [`EventLoop::spawn`], the current thread via
//! [`EventLoop::run`], an async task via [`EventLoop::run_async`], or a host
//! frame loop calling [`EventLoop::run_pending`] once per frame.

use crate::{Action, CoordinationPoster, LoopConfig, TaskError, TaskResult};
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle, Thread};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

static NEXT_LOOP_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_LOOP: Cell<Option<u64>> = const { Cell::new(None) };
}

/// Create a connected poster and event loop
#[must_use]
pub fn event_loop() -> (LoopPoster, EventLoop) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let id = NEXT_LOOP_ID.fetch_add(1, Ordering::Relaxed);
    (
        LoopPoster { sender, id },
        EventLoop {
            receiver,
            id,
            executed: 0,
        },
    )
}

/// Sending half of an event loop
///
/// Clones feed the same loop. The loop shuts down once every clone is dropped
/// and the queue is drained.
#[derive(Debug, Clone)]
pub struct LoopPoster {
    sender: mpsc::UnboundedSender<Action>,
    id: u64,
}

impl LoopPoster {
    /// Whether the calling thread is currently executing an action of this loop
    #[must_use]
    pub fn is_coordination_context(&self) -> bool {
        CURRENT_LOOP.with(|current| current.get() == Some(self.id))
    }

    /// Whether the event loop has been dropped
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl CoordinationPoster for LoopPoster {
    fn post(&self, action: Action) -> TaskResult<()> {
        self.sender.send(action).map_err(|_| TaskError::PosterClosed)
    }
}

/// Receiving half: executes posted actions one at a time, in post order
#[derive(Debug)]
pub struct EventLoop {
    receiver: mpsc::UnboundedReceiver<Action>,
    id: u64,
    executed: usize,
}

impl EventLoop {
    /// Run on a new named thread until every poster is dropped
    ///
    /// # Errors
    ///
    /// Returns `TaskError::Spawn` if the thread cannot be created.
    pub fn spawn(config: LoopConfig) -> TaskResult<(LoopPoster, CoordinationThread)> {
        let (poster, event_loop) = event_loop();
        let handle = thread::Builder::new()
            .name(config.thread_name)
            .spawn(move || event_loop.run())
            .map_err(|e| TaskError::Spawn(e.to_string()))?;

        Ok((poster, CoordinationThread { handle }))
    }

    /// Block the current thread running actions until every poster is dropped
    ///
    /// Returns the total number of actions executed by this loop.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context; use
    /// [`run_async`](Self::run_async) there instead.
    pub fn run(mut self) -> usize {
        tracing::debug!(loop_id = self.id, "Coordination loop started");
        while let Some(action) = self.receiver.blocking_recv() {
            self.execute(action);
        }
        tracing::debug!(loop_id = self.id, executed = self.executed, "Coordination loop drained");
        self.executed
    }

    /// Run actions from an async task until every poster is dropped
    pub async fn run_async(mut self) -> usize {
        tracing::debug!(loop_id = self.id, "Coordination loop started");
        while let Some(action) = self.receiver.recv().await {
            self.execute(action);
        }
        tracing::debug!(loop_id = self.id, executed = self.executed, "Coordination loop drained");
        self.executed
    }

    /// Execute every action queued so far without blocking
    ///
    /// Returns how many actions ran during this call.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(action) => {
                    self.execute(action);
                    ran += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return ran,
            }
        }
    }

    /// Total number of actions executed so far
    #[must_use]
    pub const fn executed(&self) -> usize {
        self.executed
    }

    fn execute(&mut self, action: Action) {
        let _scope = LoopScope::enter(self.id);
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(action)) {
            let error = TaskError::panicked(payload.as_ref());
            tracing::error!(loop_id = self.id, %error, "Coordination action panicked");
        }
        self.executed += 1;
    }
}

/// Handle to a coordination loop running on its own thread
#[derive(Debug)]
pub struct CoordinationThread {
    handle: JoinHandle<usize>,
}

impl CoordinationThread {
    /// The coordination thread
    #[must_use]
    pub fn thread(&self) -> &Thread {
        self.handle.thread()
    }

    /// Wait for the loop to drain after every poster has been dropped
    ///
    /// # Errors
    ///
    /// Returns `TaskError::Panicked` if the loop thread itself panicked.
    pub fn join(self) -> TaskResult<usize> {
        self.handle
            .join()
            .map_err(|payload| TaskError::panicked(payload.as_ref()))
    }
}

/// Marks the current thread as running a given loop for the guard's lifetime
struct LoopScope {
    previous: Option<u64>,
}

impl LoopScope {
    fn enter(id: u64) -> Self {
        let previous = CURRENT_LOOP.with(|current| current.replace(Some(id)));
        Self { previous }
    }
}

impl Drop for LoopScope {
    fn drop(&mut self) {
        CURRENT_LOOP.with(|current| current.set(self.previous));
    }
}
