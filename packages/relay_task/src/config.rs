//! Configuration for worker and coordination threads

use serde::{Deserialize, Serialize};

/// Configuration for a task's background thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Name given to the worker thread (shows up in panics and debuggers)
    #[serde(default = "default_worker_name")]
    pub thread_name: String,
    /// Stack size in bytes; `None` uses the platform default
    #[serde(default)]
    pub stack_size: Option<usize>,
}

/// Configuration for a dedicated coordination thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Name given to the coordination thread
    #[serde(default = "default_coordinator_name")]
    pub thread_name: String,
}

fn default_worker_name() -> String {
    "relay-task-worker".to_string()
}

fn default_coordinator_name() -> String {
    "relay-task-coordinator".to_string()
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            thread_name: default_worker_name(),
            stack_size: None,
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            thread_name: default_coordinator_name(),
        }
    }
}

impl TaskConfig {
    /// Override the worker thread name
    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Override the worker stack size
    #[must_use]
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    pub(crate) fn thread_builder(&self) -> std::thread::Builder {
        let builder = std::thread::Builder::new().name(self.thread_name.clone());
        match self.stack_size {
            Some(bytes) => builder.stack_size(bytes),
            None => builder,
        }
    }
}
