//! Cache change notifications.

use std::collections::BTreeSet;
use std::fmt;

use zkpool_core::{ZNodePath, Zxid};

/// Cached facet of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ViewKind {
    /// Node data.
    Data,
    /// Node ACL.
    Acl,
    /// Node stat.
    Stat,
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewKind::Data => write!(f, "DATA"),
            ViewKind::Acl => write!(f, "ACL"),
            ViewKind::Stat => write!(f, "STAT"),
        }
    }
}

/// Change to the cached tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// A node entered the cache.
    NodeAdded {
        /// Node path.
        path: ZNodePath,
        /// Zxid of the reply that revealed it.
        zxid: Zxid,
    },
    /// A node left the cache.
    NodeRemoved {
        /// Node path.
        path: ZNodePath,
        /// Zxid of the reply that removed it.
        zxid: Zxid,
    },
    /// Cached views of a node took different values.
    NodeUpdated {
        /// Node path.
        path: ZNodePath,
        /// Views that changed, never empty.
        views: BTreeSet<ViewKind>,
        /// Zxid of the new values.
        zxid: Zxid,
    },
}

impl CacheEvent {
    /// Path the event is about.
    pub fn path(&self) -> &ZNodePath {
        match self {
            CacheEvent::NodeAdded { path, .. }
            | CacheEvent::NodeRemoved { path, .. }
            | CacheEvent::NodeUpdated { path, .. } => path,
        }
    }

    /// Zxid the event was observed at.
    pub fn zxid(&self) -> Zxid {
        match self {
            CacheEvent::NodeAdded { zxid, .. }
            | CacheEvent::NodeRemoved { zxid, .. }
            | CacheEvent::NodeUpdated { zxid, .. } => *zxid,
        }
    }
}

/// Receives [`CacheEvent`]s.
///
/// Called on the thread that delivered the reply, after the cache has been
/// updated and before the caller of the request sees the reply.
pub trait CacheListener: Send + Sync + 'static {
    /// Handle one event.
    fn on_cache_event(&self, event: &CacheEvent);
}

impl<F> CacheListener for F
where
    F: Fn(&CacheEvent) + Send + Sync + 'static,
{
    fn on_cache_event(&self, event: &CacheEvent) {
        self(event)
    }
}
