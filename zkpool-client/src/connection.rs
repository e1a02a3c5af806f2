//! Connection-level executor contract.
//!
//! A transport (socket based or in-process) implements [`Connector`] and
//! hands out [`ClientConnection`]s. Everything above this module, from the
//! per-member factories to the session executor and the cache, speaks only
//! these traits.

use std::sync::Arc;

use async_trait::async_trait;
use zkpool_core::{
    ConnectRequest, HandshakeResult, ProtocolState, Request, ServerAddress, TransportState,
    WatchEvent, Zxid,
};

use crate::error::ClientResult;
use crate::promise::{ReplyFuture, ReplyPromise};

/// Session-lifecycle and out-of-band events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The transport moved between states.
    TransportChanged {
        /// Previous state.
        from: TransportState,
        /// New state.
        to: TransportState,
    },
    /// The session protocol moved between states.
    ProtocolChanged {
        /// Previous state.
        from: ProtocolState,
        /// New state.
        to: ProtocolState,
    },
    /// A watch fired.
    Notification(WatchEvent),
    /// A message carrying this zxid was received.
    ZxidObserved(Zxid),
}

/// Receiver of [`SessionEvent`]s.
pub trait SessionListener: Send + Sync + 'static {
    /// Handle one event. Must not block.
    fn on_event(&self, event: &SessionEvent);
}

impl<F> SessionListener for F
where
    F: Fn(&SessionEvent) + Send + Sync + 'static,
{
    fn on_event(&self, event: &SessionEvent) {
        self(event)
    }
}

/// Request/response façade.
pub trait ClientExecutor: Send + Sync + 'static {
    /// Submit `request`, completing `promise` with its reply.
    ///
    /// Never blocks. Requests are forwarded in submission order.
    fn submit_with(&self, request: Request, promise: ReplyPromise);

    /// Submit `request` and return the future of its reply.
    fn submit(&self, request: Request) -> ReplyFuture {
        let (promise, future) = ReplyPromise::new();
        self.submit_with(request, promise);
        future
    }

    /// Subscribe to session events.
    fn subscribe(&self, listener: Arc<dyn SessionListener>);

    /// Unsubscribe. Returns whether the listener was subscribed.
    fn unsubscribe(&self, listener: &Arc<dyn SessionListener>) -> bool;
}

/// One transport connection to one ensemble member.
#[async_trait]
pub trait ClientConnection: ClientExecutor {
    /// Member this connection talks to.
    fn address(&self) -> &ServerAddress;

    /// Outcome of the handshake. May be awaited any number of times.
    async fn handshake(&self) -> ClientResult<HandshakeResult>;

    /// Current transport state.
    fn transport_state(&self) -> TransportState;

    /// Current protocol state.
    fn protocol_state(&self) -> ProtocolState;

    /// Close the transport, failing outstanding requests.
    fn close(&self);
}

/// Factory of connections.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a connection to `address` and send `request` as its handshake.
    ///
    /// `observer` must be subscribed to the connection before the handshake
    /// is sent, so it sees every event the connection ever produces.
    /// Returns once the transport is open; the handshake outcome is read
    /// from [`ClientConnection::handshake`].
    async fn connect(
        &self,
        address: &ServerAddress,
        request: ConnectRequest,
        observer: Arc<dyn SessionListener>,
    ) -> ClientResult<Arc<dyn ClientConnection>>;
}
