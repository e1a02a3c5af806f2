//! Error types for the zkpool facade.

use thiserror::Error;
use zkpool_core::{OpCode, PathError};

/// Errors raised while folding a reply into the cache.
///
/// These never reach the caller of the request that produced the reply;
/// the cache logs them and moves on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The reply does not have the shape the request implies.
    #[error("malformed {opcode:?} reply: {reason}")]
    Malformed {
        /// Kind of the request.
        opcode: OpCode,
        /// What did not match.
        reason: String,
    },

    /// A reply named a child label that is not a valid path component.
    #[error("invalid path in reply: {0}")]
    InvalidPath(#[from] PathError),
}

impl CacheError {
    pub(crate) fn malformed(opcode: OpCode, reason: impl Into<String>) -> Self {
        Self::Malformed {
            opcode,
            reason: reason.into(),
        }
    }
}

/// Result type for cache maintenance.
pub type CacheResult<T> = Result<T, CacheError>;
