//! Materialized, zxid-ordered cache of the nodes seen through an executor.
//!
//! [`TreeCache`] wraps any [`ClientExecutor`](zkpool_client::ClientExecutor)
//! and folds every reply into a trie of [`CachedNode`]s before the caller
//! observes it. Changes are announced to [`CacheListener`]s as
//! [`CacheEvent`]s.

mod event;
mod node;
mod tree;

pub use event::{CacheEvent, CacheListener, ViewKind};
pub use node::{CachedNode, Stamped};
pub use tree::TreeCache;
