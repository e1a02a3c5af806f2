//! Task spawning abstraction.
//!
//! Nothing in zkpool owns worker threads. Every continuation runs on a
//! caller-supplied [`TaskProvider`]: asynchronous continuations through
//! [`TaskProvider::spawn_task`], synchronous mailbox drains through
//! [`TaskProvider::execute`].

use std::future::Future;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Provider for running continuations on an executor the caller chooses.
pub trait TaskProvider: Clone + Send + Sync + 'static {
    /// Spawn a named asynchronous task.
    fn spawn_task<F>(&self, name: &str, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static;

    /// Run a named synchronous task.
    ///
    /// The default implementation wraps the closure in a spawned task.
    fn execute<F>(&self, name: &str, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn_task(name, async move { task() });
    }
}

/// Task provider spawning onto a tokio runtime.
///
/// Captures the runtime handle at construction, so it can be cloned into
/// callbacks that fire on threads outside the runtime.
#[derive(Clone, Debug)]
pub struct TokioTaskProvider {
    handle: Handle,
}

impl TokioTaskProvider {
    /// Create a provider bound to the current runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn new() -> Self {
        Self {
            handle: Handle::current(),
        }
    }

    /// Create a provider bound to an explicit runtime handle.
    pub fn with_handle(handle: Handle) -> Self {
        Self { handle }
    }
}

impl Default for TokioTaskProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskProvider for TokioTaskProvider {
    fn spawn_task<F>(&self, name: &str, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task_name = name.to_string();
        self.handle.spawn(async move {
            tracing::trace!(task = %task_name, "task starting");
            future.await;
            tracing::trace!(task = %task_name, "task completed");
        })
    }
}

/// Direct executor: synchronous tasks run on the calling thread.
///
/// Asynchronous tasks go to the ambient tokio runtime at the time
/// [`TaskProvider::spawn_task`] is called.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineTaskProvider;

impl InlineTaskProvider {
    /// Create an inline provider.
    pub fn new() -> Self {
        Self
    }
}

impl TaskProvider for InlineTaskProvider {
    fn spawn_task<F>(&self, name: &str, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task_name = name.to_string();
        tokio::spawn(async move {
            tracing::trace!(task = %task_name, "task starting");
            future.await;
            tracing::trace!(task = %task_name, "task completed");
        })
    }

    fn execute<F>(&self, _name: &str, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        task();
    }
}
