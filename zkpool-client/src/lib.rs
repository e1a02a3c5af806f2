//! # zkpool-client
//!
//! Ensemble-aware session management for zkpool.
//!
//! - [`SessionExecutor`]: keeps one session alive across member failures,
//!   resuming it elsewhere and flushing requests queued in the gap
//! - [`EnsembleViewFactory`] / [`ServerViewFactory`]: member selection and
//!   memoized per-member connection factories sharing a [`ZxidTracker`]
//! - [`ClientExecutor`], [`ClientConnection`], [`Connector`]: the contract a
//!   transport implements
//! - [`ReplyPromise`] / [`ReplyFuture`]: one-shot reply pair with
//!   interception hooks
//! - [`intravm`]: an in-process transport for tests and demos

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod config;
mod connection;
mod ensemble;
mod error;
pub mod intravm;
mod promise;
mod server_view;
mod session;
mod zxid;

pub use config::SessionConfig;
pub use connection::{ClientConnection, ClientExecutor, Connector, SessionEvent, SessionListener};
pub use ensemble::EnsembleViewFactory;
pub use error::{ClientError, ClientResult};
pub use promise::{ReplyFuture, ReplyPromise, ReplyResult};
pub use server_view::ServerViewFactory;
pub use session::{Readiness, SessionExecutor};
pub use zxid::{ZxidListener, ZxidTracker};
