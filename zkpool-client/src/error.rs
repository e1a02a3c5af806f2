//! Error types for session and connection operations.

use thiserror::Error;
use zkpool_core::ServerAddress;

/// Errors surfaced by connections and the session executor.
///
/// Protocol-level failures such as "no node" are not errors here; they
/// arrive as [`Response::Error`](zkpool_core::Response::Error) inside a
/// successful reply.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The transport closed and no ensemble member is left to fail over to.
    #[error("Connection lost")]
    ConnectionLost,

    /// A connection could not be established.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The operation was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,

    /// The session executor was stopped.
    #[error("Session executor stopped")]
    Stopped,

    /// The reply promise was dropped without a response.
    #[error("Promise dropped without reply")]
    BrokenPromise,

    /// The operation did not complete in time.
    #[error("Operation timed out")]
    Timeout,

    /// The address is not a member of the configured ensemble.
    #[error("{0} is not a member of the ensemble")]
    NotInEnsemble(ServerAddress),
}

impl ClientError {
    /// Whether the error means the connection is gone for good.
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            ClientError::ConnectionLost | ClientError::ConnectionFailed(_)
        )
    }
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
