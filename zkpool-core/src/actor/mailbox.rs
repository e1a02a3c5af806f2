//! Single-consumer mailbox actor.
//!
//! An [`Actor`] owns an unbounded mailbox and drains it through a
//! cooperative single-runner protocol: whichever thread wins the
//! `Waiting → Scheduled` compare-and-swap hands one run to the executor,
//! and that run applies items until the mailbox is empty. No worker thread
//! is owned; the executor is borrowed from the caller.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::lifecycle::ActorState;
use crate::TaskProvider;

/// Behaviour plugged into an [`Actor`].
pub trait ActorHandler: Send + Sync + 'static {
    /// Mailbox item type.
    type Item: Send + 'static;

    /// Apply one item. Never runs concurrently with itself for one actor.
    ///
    /// A panic escaping this method terminates the actor and then unwinds
    /// into the executor that ran the drain.
    fn apply(&self, item: Self::Item);

    /// Called for every item still queued when the actor stops.
    fn cancel(&self, item: Self::Item) {
        drop(item);
    }
}

/// Error returned by [`Actor::send`] when the actor has terminated.
///
/// Hands the rejected item back to the caller.
pub struct SendError<T>(pub T);

impl<T> SendError<T> {
    /// Recover the rejected item.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendError").finish_non_exhaustive()
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor is {}", ActorState::Terminated)
    }
}

impl<T> std::error::Error for SendError<T> {}

struct Envelope<T> {
    seq: u64,
    item: T,
}

struct ActorInner<H: ActorHandler, T> {
    name: String,
    state: AtomicU8,
    next_seq: AtomicU64,
    mailbox: Mutex<VecDeque<Envelope<H::Item>>>,
    handler: H,
    executor: T,
}

/// Handle to a mailbox actor. Clones share the same mailbox.
pub struct Actor<H: ActorHandler, T: TaskProvider> {
    inner: Arc<ActorInner<H, T>>,
}

impl<H: ActorHandler, T: TaskProvider> Clone for Actor<H, T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Non-owning handle to an [`Actor`].
///
/// Lets a handler reach its own actor without keeping it alive.
pub struct WeakActor<H: ActorHandler, T: TaskProvider> {
    inner: Weak<ActorInner<H, T>>,
}

impl<H: ActorHandler, T: TaskProvider> WeakActor<H, T> {
    /// Upgrade to a strong handle if the actor is still alive.
    pub fn upgrade(&self) -> Option<Actor<H, T>> {
        self.inner.upgrade().map(|inner| Actor { inner })
    }
}

impl<H: ActorHandler, T: TaskProvider> Clone for WeakActor<H, T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Stops the actor if a drain unwinds out of `apply`.
struct TerminateOnUnwind<'a, H: ActorHandler, T: TaskProvider> {
    actor: &'a Actor<H, T>,
    armed: bool,
}

impl<H: ActorHandler, T: TaskProvider> Drop for TerminateOnUnwind<'_, H, T> {
    fn drop(&mut self) {
        if self.armed {
            tracing::error!(actor = %self.actor.inner.name, "apply panicked, terminating actor");
            self.actor.stop();
        }
    }
}

impl<H: ActorHandler, T: TaskProvider> Actor<H, T> {
    /// Create an actor in the `Waiting` state.
    pub fn new(name: impl Into<String>, handler: H, executor: T) -> Self {
        Self {
            inner: Arc::new(ActorInner {
                name: name.into(),
                state: AtomicU8::new(ActorState::Waiting as u8),
                next_seq: AtomicU64::new(0),
                mailbox: Mutex::new(VecDeque::new()),
                handler,
                executor,
            }),
        }
    }

    /// Create an actor whose handler holds a [`WeakActor`] to itself.
    ///
    /// Handlers that post follow-up items from spawned continuations use
    /// this to reach their own mailbox.
    pub fn new_cyclic<F>(name: impl Into<String>, build: F, executor: T) -> Self
    where
        F: FnOnce(WeakActor<H, T>) -> H,
    {
        let name = name.into();
        let inner = Arc::new_cyclic(|weak| ActorInner {
            name,
            state: AtomicU8::new(ActorState::Waiting as u8),
            next_seq: AtomicU64::new(0),
            mailbox: Mutex::new(VecDeque::new()),
            handler: build(WeakActor {
                inner: weak.clone(),
            }),
            executor,
        });
        Self { inner }
    }

    /// Actor name, used in log fields.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Non-owning handle to this actor.
    pub fn downgrade(&self) -> WeakActor<H, T> {
        WeakActor {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// The handler applying mailbox items.
    pub fn handler(&self) -> &H {
        &self.inner.handler
    }

    /// Current scheduling state.
    pub fn state(&self) -> ActorState {
        ActorState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn is_terminated(&self) -> bool {
        self.state().is_terminal()
    }

    /// Number of items waiting in the mailbox.
    pub fn len(&self) -> usize {
        self.inner.mailbox.lock().len()
    }

    /// Whether the mailbox is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.mailbox.lock().is_empty()
    }

    /// Enqueue an item and try to schedule a drain.
    ///
    /// # Errors
    ///
    /// Returns the item inside [`SendError`] if the actor has terminated.
    /// An item accepted before a concurrent [`stop`](Self::stop) is
    /// cancelled by that stop instead.
    pub fn send(&self, item: H::Item) -> Result<(), SendError<H::Item>> {
        if self.is_terminated() {
            return Err(SendError(item));
        }

        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        self.inner.mailbox.lock().push_back(Envelope { seq, item });

        if !self.schedule() && self.is_terminated() {
            let mut mailbox = self.inner.mailbox.lock();
            if let Some(position) = mailbox.iter().position(|e| e.seq == seq) {
                if let Some(envelope) = mailbox.remove(position) {
                    return Err(SendError(envelope.item));
                }
            }
        }
        Ok(())
    }

    /// Drain the mailbox. Only the run that wins `Scheduled → Running`
    /// applies items; any other call returns immediately.
    pub fn run(&self) {
        if !self.transition(ActorState::Scheduled, ActorState::Running) {
            return;
        }

        let mut guard = TerminateOnUnwind {
            actor: self,
            armed: true,
        };
        while let Some(item) = self.next() {
            self.inner.handler.apply(item);
        }
        guard.armed = false;

        if self.transition(ActorState::Running, ActorState::Waiting) {
            // items raced in after the last poll
            self.schedule();
        }
    }

    /// Terminate the actor and cancel everything still queued.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn stop(&self) -> bool {
        if self.is_terminated() {
            return false;
        }
        let previous = self
            .inner
            .state
            .swap(ActorState::Terminated as u8, Ordering::AcqRel);
        if ActorState::from_u8(previous).is_terminal() {
            return false;
        }

        let drained: Vec<_> = self.inner.mailbox.lock().drain(..).collect();
        tracing::debug!(
            actor = %self.inner.name,
            cancelled = drained.len(),
            "actor stopped"
        );
        for envelope in drained {
            self.inner.handler.cancel(envelope.item);
        }
        true
    }

    fn next(&self) -> Option<H::Item> {
        if self.is_terminated() {
            return None;
        }
        self.inner.mailbox.lock().pop_front().map(|e| e.item)
    }

    fn schedule(&self) -> bool {
        if self.inner.mailbox.lock().is_empty() {
            return false;
        }
        if !self.transition(ActorState::Waiting, ActorState::Scheduled) {
            return false;
        }
        let actor = self.clone();
        self.inner
            .executor
            .execute(&self.inner.name, move || actor.run());
        true
    }

    fn transition(&self, from: ActorState, to: ActorState) -> bool {
        debug_assert!(from.can_transition_to(to));
        self.inner
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl<H: ActorHandler, T: TaskProvider> fmt::Debug for Actor<H, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field("queued", &self.len())
            .finish()
    }
}
