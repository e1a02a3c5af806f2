//! Mailbox actors.
//!
//! - [`Actor`]: unbounded mailbox drained by at most one runner at a time
//! - [`ActorState`]: the compare-and-swap scheduling state
//! - [`ActorExecutor`]: serial job executor built on an actor

mod executor;
mod lifecycle;
mod mailbox;

pub use executor::ActorExecutor;
pub use lifecycle::ActorState;
pub use mailbox::{Actor, ActorHandler, SendError, WeakActor};
