//! # zkpool
//!
//! Session-resilient client runtime for a ZooKeeper-style coordination
//! service.
//!
//! A [`SessionExecutor`] keeps one logical session alive across an ensemble:
//! when the transport to one member is lost it picks another member,
//! resumes the session there after a short randomized backoff, and replays
//! the requests that were submitted in the meantime. A [`TreeCache`] can
//! wrap any executor to keep a zxid-ordered mirror of the nodes its traffic
//! has touched.
//!
//! ## Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              zkpool (this crate)                            │
//! │   Re-exports all functionality + materialized tree cache    │
//! ├─────────────────────────────────────────────────────────────┤
//! │                     zkpool-client                           │
//! │  Reply promises, connection contract, zxid tracking,        │
//! │  ensemble factories, SessionExecutor, in-process transport  │
//! ├─────────────────────────────────────────────────────────────┤
//! │                     zkpool-core                             │
//! │  Provider traits: Time, Task, Random                        │
//! │  Actor mailbox, records, paths, session and ensemble types  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use zkpool::prelude::*;
//!
//! let executor = SessionExecutor::new(
//!     "zk1:2181,zk2:2181,zk3:2181".parse()?,
//!     connector,
//!     TokioProviders::new(),
//!     SessionConfig::default(),
//! );
//! executor.start();
//! let cache = TreeCache::new(executor);
//! cache.submit(Request::GetData { path: "/config".parse()?, watch: false }).await?;
//! assert!(cache.contains(&"/config".parse()?));
//! ```
//!
//! ## Which Crate to Use
//!
//! | Use case | Crate |
//! |----------|-------|
//! | Full client (recommended) | `zkpool` |
//! | Providers, actor and records only | `zkpool-core` |
//! | Session management without the cache | `zkpool-client` |

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

pub use zkpool_client::*;
pub use zkpool_core::*;

pub mod cache;
pub mod error;
pub mod prelude;

pub use cache::{CacheEvent, CacheListener, CachedNode, Stamped, TreeCache, ViewKind};
pub use error::{CacheError, CacheResult};
