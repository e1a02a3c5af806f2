//! Serial executor built on an [`Actor`].

use std::fmt;
use std::future::Future;

use tokio::task::JoinHandle;

use super::mailbox::{Actor, ActorHandler};
use crate::TaskProvider;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct RunJob;

impl ActorHandler for RunJob {
    type Item = Job;

    fn apply(&self, job: Job) {
        job();
    }

    // Jobs are notifications; they still fire after stop so that nobody
    // waiting on them is left hanging.
    fn cancel(&self, job: Job) {
        job();
    }
}

/// Runs synchronous jobs one at a time, in submission order, on top of
/// another [`TaskProvider`].
///
/// Used to deliver listener callbacks without ever running two of them
/// concurrently. Asynchronous tasks are forwarded to the underlying
/// provider unchanged.
#[derive(Clone)]
pub struct ActorExecutor<T: TaskProvider> {
    actor: Actor<RunJob, T>,
    inner: T,
}

impl<T: TaskProvider> ActorExecutor<T> {
    /// Create a serial executor draining on `inner`.
    pub fn new(name: impl Into<String>, inner: T) -> Self {
        Self {
            actor: Actor::new(name, RunJob, inner.clone()),
            inner,
        }
    }

    /// Stop accepting jobs. Queued jobs run on the calling thread.
    pub fn shutdown(&self) {
        self.actor.stop();
    }
}

impl<T: TaskProvider> TaskProvider for ActorExecutor<T> {
    fn spawn_task<F>(&self, name: &str, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.spawn_task(name, future)
    }

    fn execute<F>(&self, _name: &str, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Err(rejected) = self.actor.send(Box::new(task)) {
            tracing::trace!(executor = %self.actor.name(), "executor shut down, running job inline");
            (rejected.into_inner())();
        }
    }
}

impl<T: TaskProvider> fmt::Debug for ActorExecutor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorExecutor")
            .field("actor", &self.actor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::{InlineTaskProvider, TokioTaskProvider};

    #[test]
    fn test_jobs_run_in_order() {
        let executor = ActorExecutor::new("serial", InlineTaskProvider::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let seen = seen.clone();
            executor.execute("job", move || seen.lock().push(i));
        }
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_shutdown_runs_late_jobs_inline() {
        let executor = ActorExecutor::new("closed", InlineTaskProvider::new());
        executor.shutdown();
        let seen = Arc::new(Mutex::new(false));
        let s = seen.clone();
        executor.execute("late", move || *s.lock() = true);
        assert!(*seen.lock());
    }

    #[tokio::test]
    async fn test_tokio_backed_jobs_preserve_order() {
        let executor = ActorExecutor::new("tokio-serial", TokioTaskProvider::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = tokio::sync::oneshot::channel();
        for i in 0..100 {
            let seen = seen.clone();
            executor.execute("job", move || seen.lock().push(i));
        }
        executor.execute("done", move || {
            let _ = tx.send(());
        });
        rx.await.expect("final job runs");
        assert_eq!(*seen.lock(), (0..100).collect::<Vec<_>>());
    }
}
