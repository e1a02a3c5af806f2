//! Common imports for zkpool clients.

pub use crate::cache::{CacheEvent, CacheListener, CachedNode, Stamped, TreeCache, ViewKind};
pub use crate::error::CacheError;
pub use zkpool_client::{
    ClientConnection, ClientError, ClientExecutor, ClientResult, Connector, SessionConfig,
    SessionEvent, SessionExecutor, SessionListener,
};
pub use zkpool_core::{
    Acl, CreateMode, EnsembleView, ErrorCode, Providers, Reply, Request, Response,
    ServerAddress, Stat, TokioProviders, ZNodePath, Zxid,
};

pub use std::sync::Arc;
pub use std::time::Duration;
