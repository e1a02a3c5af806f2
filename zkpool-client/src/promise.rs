//! One-shot reply promise and future.
//!
//! A [`ReplyPromise`] is handed to whoever will produce the reply; the
//! matching [`ReplyFuture`] is returned to the caller. If the promise is
//! dropped without being completed, the future resolves to
//! [`ClientError::BrokenPromise`]. Dropping the future is cancellation:
//! executors poll [`ReplyPromise::is_canceled`] to skip dead work.
//!
//! # Example
//!
//! ```rust
//! use zkpool_client::ReplyPromise;
//! use zkpool_core::{Reply, Response};
//!
//! let (promise, future) = ReplyPromise::new();
//! promise.send(Reply::new(1, 10, Response::Check));
//! let reply = futures::executor::block_on(future).unwrap();
//! assert_eq!(reply.zxid, 10);
//! ```

use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use zkpool_core::Reply;

use crate::error::{ClientError, ClientResult};

/// Outcome delivered through a promise.
pub type ReplyResult = ClientResult<Reply>;

type Hook = Box<dyn FnOnce(&ReplyResult) + Send + 'static>;

/// Producer side of a reply.
pub struct ReplyPromise {
    sender: Option<oneshot::Sender<ReplyResult>>,
    hooks: Vec<Hook>,
}

impl ReplyPromise {
    /// Create a connected promise/future pair.
    pub fn new() -> (Self, ReplyFuture) {
        let (sender, receiver) = oneshot::channel();
        (
            Self {
                sender: Some(sender),
                hooks: Vec::new(),
            },
            ReplyFuture { receiver },
        )
    }

    /// Register a hook that observes the result before the future does.
    ///
    /// Hooks run in registration order on the thread completing the
    /// promise, and also run when the future was already dropped.
    pub fn intercept<F>(&mut self, hook: F)
    where
        F: FnOnce(&ReplyResult) + Send + 'static,
    {
        self.hooks.push(Box::new(hook));
    }

    /// Whether the waiting future has been dropped.
    pub fn is_canceled(&self) -> bool {
        match &self.sender {
            Some(sender) => sender.is_closed(),
            None => true,
        }
    }

    /// Complete with a reply.
    pub fn send(self, reply: Reply) {
        self.complete(Ok(reply));
    }

    /// Complete with an error.
    pub fn send_error(self, error: ClientError) {
        self.complete(Err(error));
    }

    /// Complete with a result.
    pub fn complete(mut self, result: ReplyResult) {
        self.fulfill(result);
    }

    fn fulfill(&mut self, result: ReplyResult) {
        let Some(sender) = self.sender.take() else {
            return;
        };
        for hook in self.hooks.drain(..) {
            // a hook never decides whether the caller gets its reply
            if panic::catch_unwind(AssertUnwindSafe(|| hook(&result))).is_err() {
                tracing::error!("reply hook panicked");
            }
        }
        // receiver gone means the caller cancelled; nothing to deliver
        let _ = sender.send(result);
    }
}

impl Drop for ReplyPromise {
    fn drop(&mut self) {
        if self.sender.is_some() {
            tracing::warn!("ReplyPromise dropped without fulfillment - sent BrokenPromise");
            self.fulfill(Err(ClientError::BrokenPromise));
        }
    }
}

impl fmt::Debug for ReplyPromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyPromise")
            .field("fulfilled", &self.sender.is_none())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

/// Consumer side of a reply.
#[must_use = "dropping a ReplyFuture cancels the request"]
pub struct ReplyFuture {
    receiver: oneshot::Receiver<ReplyResult>,
}

impl ReplyFuture {
    /// A future that is already resolved.
    pub fn ready(result: ReplyResult) -> Self {
        let (promise, future) = ReplyPromise::new();
        promise.complete(result);
        future
    }

    /// Take the result if it is already available.
    pub fn try_take(&mut self) -> Option<ReplyResult> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(ClientError::BrokenPromise)),
        }
    }
}

impl Future for ReplyFuture {
    type Output = ReplyResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ClientError::BrokenPromise)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl fmt::Debug for ReplyFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyFuture").finish_non_exhaustive()
    }
}
