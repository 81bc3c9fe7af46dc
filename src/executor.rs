//! Task submission for asynchronous notification callbacks.
//!
//! Readers never own a global scheduler. Whoever builds a reader may inject a
//! [`TaskExecutor`]; callbacks registered with `set_on_data_available` run
//! through it. Without one they run inline on the producer's thread.

use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::warn;

use crate::{ReaderError, Result};

/// A unit of work submitted to an executor.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Capability to run a task at some later point.
pub trait TaskExecutor: Send + Sync + fmt::Debug {
    fn submit(&self, task: Task);
}

/// Runs each task immediately on the submitting thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl TaskExecutor for InlineExecutor {
    fn submit(&self, task: Task) {
        task();
    }
}

/// Runs each task on a freshly spawned OS thread.
#[derive(Debug, Default, Clone)]
pub struct ThreadExecutor {
    name: Option<String>,
}

impl ThreadExecutor {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()) }
    }
}

impl TaskExecutor for ThreadExecutor {
    fn submit(&self, task: Task) {
        let mut builder = std::thread::Builder::new();
        if let Some(name) = &self.name {
            builder = builder.name(name.clone());
        }
        // A failed spawn drops the task
        if let Err(e) = builder.spawn(task) {
            warn!(error = %e, "failed to spawn notification thread");
        }
    }
}

/// Runs each task on a tokio runtime's blocking pool.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Executor bound to the runtime the caller is running on.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| ReaderError::invalid_state(format!("no tokio runtime available: {}", e)))
    }
}

impl TaskExecutor for TokioExecutor {
    fn submit(&self, task: Task) {
        // Detached; the join handle is not needed for fire-and-forget callbacks
        drop(self.handle.spawn_blocking(task));
    }
}

/// Default executor used when none is injected.
pub fn inline() -> Arc<dyn TaskExecutor> {
    Arc::new(InlineExecutor)
}
