//! # Relay Task
//!
//! Runs a unit of work on a background thread, captures its outcome, and
//! relays a completion action to one designated coordination context (an
//! event loop, a UI thread) where it never races other coordination work.
//!
//! - [`Task`] owns the work unit, its [`Outcome`], and a [`CancelSignal`].
//! - [`CoordinationPoster`] is the seam to the coordination context;
//!   [`event_loop`] provides a ready-made one.

pub mod cancel;
pub mod config;
pub mod error;
pub mod event_loop;
pub mod outcome;
pub mod poster;
pub mod task;

pub use cancel::CancelSignal;
pub use config::{LoopConfig, TaskConfig};
pub use error::{TaskError, TaskResult};
pub use event_loop::{event_loop, CoordinationThread, EventLoop, LoopPoster};
pub use outcome::{Outcome, TaskState};
pub use poster::{Action, CoordinationPoster, FnPoster};
pub use task::{Task, TaskBuilder, WorkUnit};
