//! # zkpool-core
//!
//! Core abstractions for the zkpool coordination-service client.
//!
//! - **Provider traits**: [`TaskProvider`], [`TimeProvider`] and
//!   [`RandomProvider`], bundled by [`Providers`]. Nothing in zkpool owns a
//!   thread; every continuation runs on a provider the caller supplies.
//! - **Actor**: [`Actor`], a single-consumer mailbox drained by at most one
//!   runner at a time. It is the only serialization primitive the session
//!   layer relies on.
//! - **Records**: [`Request`], [`Response`], [`Reply`], [`Stat`], [`Acl`] and
//!   friends. Shapes only; encoding is left to transports.
//! - **Identity**: [`ServerAddress`], [`EnsembleView`], [`Session`].

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

pub mod actor;
mod error;
mod listeners;
mod path;
mod providers;
mod random;
mod records;
mod state;
mod task;
mod time;
mod types;

// Actor exports
pub use actor::{Actor, ActorExecutor, ActorHandler, ActorState, SendError, WeakActor};

// Error exports
pub use error::{ParseError, ParseResult, PathError, PathResult};

// Provider trait exports
pub use providers::{CustomProviders, Providers, TokioProviders};
pub use random::{RandomProvider, SeededRandomProvider, TokioRandomProvider};
pub use task::{InlineTaskProvider, TaskProvider, TokioTaskProvider};
pub use time::{TimeError, TimeProvider, TokioTimeProvider};

// Record exports
pub use listeners::Listeners;
pub use path::ZNodePath;
pub use records::{
    perms, Acl, ConnectRequest, CreateMode, ErrorCode, Id, OpCode, Reply, Request, Response, Stat,
    WatchEvent, WatchedEventType, Xid, Zxid,
};
pub use state::{ProtocolState, TransportState};
pub use types::{EnsembleView, HandshakeResult, ServerAddress, Session, DEFAULT_PORT};
