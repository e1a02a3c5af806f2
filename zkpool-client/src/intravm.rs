//! In-process transport.
//!
//! [`IntraVmConnector`] hands out connections that never leave the process.
//! It keeps a session table so resumption is validated the way a member
//! would validate it, stamps every reply with a fresh zxid, and lets tests
//! kill connections, expire sessions and make members unreachable. Request
//! handling is delegated to a pluggable [`RequestHandler`]; this is a test
//! double for the transport, not a server.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicI32, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use zkpool_core::{
    ConnectRequest, ErrorCode, HandshakeResult, Listeners, ProtocolState, Reply, Request,
    Response, ServerAddress, Session, TransportState, WatchEvent, Zxid,
};

use crate::connection::{ClientConnection, ClientExecutor, Connector, SessionEvent, SessionListener};
use crate::error::{ClientError, ClientResult};
use crate::promise::ReplyPromise;

/// Answers requests on in-process connections.
pub trait RequestHandler: Send + Sync + 'static {
    /// Produce the response to `request` issued by session `session_id`.
    fn handle(&self, session_id: i64, request: &Request) -> Response;
}

impl<F> RequestHandler for F
where
    F: Fn(i64, &Request) -> Response + Send + Sync + 'static,
{
    fn handle(&self, session_id: i64, request: &Request) -> Response {
        self(session_id, request)
    }
}

/// Handler answering every request with `Unimplemented`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unimplemented;

impl RequestHandler for Unimplemented {
    fn handle(&self, _session_id: i64, _request: &Request) -> Response {
        Response::Error(ErrorCode::Unimplemented)
    }
}

struct SessionEntry {
    password: Vec<u8>,
    timeout: Duration,
}

struct IntraVmInner {
    handler: Arc<dyn RequestHandler>,
    zxid: AtomicI64,
    next_session: AtomicI64,
    next_connection: AtomicU64,
    unreachable: Mutex<HashSet<ServerAddress>>,
    sessions: Mutex<HashMap<i64, SessionEntry>>,
    connections: Mutex<Vec<Arc<IntraVmConnection>>>,
    handshakes: Mutex<Vec<(ServerAddress, ConnectRequest)>>,
}

impl IntraVmInner {
    fn next_zxid(&self) -> Zxid {
        self.zxid.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn handshake(&self, request: &ConnectRequest) -> HandshakeResult {
        let mut sessions = self.sessions.lock();
        if request.is_new_session() {
            let id = self.next_session.fetch_add(1, Ordering::Relaxed);
            let password = format!("pw-{id:x}").into_bytes();
            sessions.insert(
                id,
                SessionEntry {
                    password: password.clone(),
                    timeout: request.timeout,
                },
            );
            return HandshakeResult::Valid(Session::new(id, password, request.timeout));
        }
        match sessions.get(&request.session_id) {
            Some(entry) if entry.password == request.password => HandshakeResult::Valid(
                Session::new(request.session_id, entry.password.clone(), entry.timeout),
            ),
            _ => HandshakeResult::Invalid,
        }
    }
}

/// [`Connector`] backed by an in-memory session table.
#[derive(Clone)]
pub struct IntraVmConnector {
    inner: Arc<IntraVmInner>,
}

impl IntraVmConnector {
    /// Connector answering requests with [`Unimplemented`].
    pub fn new() -> Self {
        Self::with_handler(Unimplemented)
    }

    /// Connector answering requests through `handler`.
    pub fn with_handler(handler: impl RequestHandler) -> Self {
        Self {
            inner: Arc::new(IntraVmInner {
                handler: Arc::new(handler),
                zxid: AtomicI64::new(0),
                next_session: AtomicI64::new(0x100),
                next_connection: AtomicU64::new(1),
                unreachable: Mutex::new(HashSet::new()),
                sessions: Mutex::new(HashMap::new()),
                connections: Mutex::new(Vec::new()),
                handshakes: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Refuse (or accept again) new connections to `address`.
    pub fn set_reachable(&self, address: &ServerAddress, reachable: bool) {
        let mut unreachable = self.inner.unreachable.lock();
        if reachable {
            unreachable.remove(address);
        } else {
            unreachable.insert(address.clone());
        }
    }

    /// Close every open connection to `address`.
    pub fn kill(&self, address: &ServerAddress) -> usize {
        let victims: Vec<_> = self
            .inner
            .connections
            .lock()
            .iter()
            .filter(|c| c.address() == address && !c.transport_state().is_terminal())
            .cloned()
            .collect();
        for connection in &victims {
            tracing::debug!(server = %address, connection = connection.id, "killing connection");
            connection.close();
        }
        victims.len()
    }

    /// Forget a session so later resumptions are refused.
    pub fn expire_session(&self, session_id: i64) -> bool {
        self.inner.sessions.lock().remove(&session_id).is_some()
    }

    /// Whether the session table holds `session_id`.
    pub fn has_session(&self, session_id: i64) -> bool {
        self.inner.sessions.lock().contains_key(&session_id)
    }

    /// Every connection made so far, oldest first.
    pub fn connections(&self) -> Vec<Arc<IntraVmConnection>> {
        self.inner.connections.lock().clone()
    }

    /// Most recent connection to `address`.
    pub fn last_connection(&self, address: &ServerAddress) -> Option<Arc<IntraVmConnection>> {
        self.inner
            .connections
            .lock()
            .iter()
            .rev()
            .find(|c| c.address() == address)
            .cloned()
    }

    /// Every handshake received, in arrival order.
    pub fn handshakes(&self) -> Vec<(ServerAddress, ConnectRequest)> {
        self.inner.handshakes.lock().clone()
    }

    /// Highest zxid assigned so far.
    pub fn last_zxid(&self) -> Zxid {
        self.inner.zxid.load(Ordering::Acquire)
    }

    /// Deliver a watch notification on every open connection of `session_id`.
    pub fn notify(&self, session_id: i64, event: WatchEvent) {
        let targets: Vec<_> = self
            .inner
            .connections
            .lock()
            .iter()
            .filter(|c| c.session_id() == Some(session_id) && c.protocol_state().is_connected())
            .cloned()
            .collect();
        for connection in targets {
            connection.publish(SessionEvent::Notification(event.clone()));
        }
    }
}

impl Default for IntraVmConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IntraVmConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntraVmConnector")
            .field("connections", &self.inner.connections.lock().len())
            .field("sessions", &self.inner.sessions.lock().len())
            .field("last_zxid", &self.last_zxid())
            .finish()
    }
}

#[async_trait]
impl Connector for IntraVmConnector {
    async fn connect(
        &self,
        address: &ServerAddress,
        request: ConnectRequest,
        observer: Arc<dyn SessionListener>,
    ) -> ClientResult<Arc<dyn ClientConnection>> {
        if self.inner.unreachable.lock().contains(address) {
            return Err(ClientError::ConnectionFailed(format!(
                "{address} is unreachable"
            )));
        }
        self.inner
            .handshakes
            .lock()
            .push((address.clone(), request.clone()));

        let handshake = self.inner.handshake(&request);
        let (protocol, session_id) = match &handshake {
            HandshakeResult::Valid(session) => (ProtocolState::Connected, Some(session.id())),
            HandshakeResult::Invalid => (ProtocolState::Error, None),
        };
        let connection = Arc::new(IntraVmConnection {
            id: self.inner.next_connection.fetch_add(1, Ordering::Relaxed),
            address: address.clone(),
            ensemble: self.inner.clone(),
            handshake,
            session_id,
            transport: Mutex::new(TransportState::Opened),
            protocol: Mutex::new(protocol),
            listeners: Listeners::new(),
            next_xid: AtomicI32::new(1),
            requests: Mutex::new(Vec::new()),
        });
        connection.subscribe(observer);
        let seen = self.last_zxid();
        if connection.handshake.is_valid() && seen > 0 {
            // the member's reply to a handshake carries its last zxid
            connection.publish(SessionEvent::ZxidObserved(seen));
        }
        tracing::debug!(
            server = %address,
            connection = connection.id,
            valid = connection.handshake.is_valid(),
            "intra-vm connection opened"
        );
        self.inner.connections.lock().push(connection.clone());
        Ok(connection)
    }
}

/// One in-process connection.
pub struct IntraVmConnection {
    id: u64,
    address: ServerAddress,
    ensemble: Arc<IntraVmInner>,
    handshake: HandshakeResult,
    session_id: Option<i64>,
    transport: Mutex<TransportState>,
    protocol: Mutex<ProtocolState>,
    listeners: Listeners<dyn SessionListener>,
    next_xid: AtomicI32,
    requests: Mutex<Vec<Request>>,
}

impl IntraVmConnection {
    /// Connection id, unique per connector.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Session bound to this connection, if the handshake was valid.
    pub fn session_id(&self) -> Option<i64> {
        self.session_id
    }

    /// Requests received, in arrival order.
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }

    fn publish(&self, event: SessionEvent) {
        for listener in self.listeners.snapshot() {
            listener.on_event(&event);
        }
    }

    fn set_transport(&self, to: TransportState) {
        let from = {
            let mut state = self.transport.lock();
            if !state.can_transition_to(to) {
                return;
            }
            std::mem::replace(&mut *state, to)
        };
        self.publish(SessionEvent::TransportChanged { from, to });
    }

    fn set_protocol(&self, to: ProtocolState) {
        let from = std::mem::replace(&mut *self.protocol.lock(), to);
        if from != to {
            self.publish(SessionEvent::ProtocolChanged { from, to });
        }
    }
}

impl ClientExecutor for IntraVmConnection {
    fn submit_with(&self, request: Request, promise: ReplyPromise) {
        let Some(session_id) = self.session_id else {
            promise.send_error(ClientError::ConnectionLost);
            return;
        };
        if self.transport_state() != TransportState::Opened
            || !self.protocol_state().is_connected()
        {
            promise.send_error(ClientError::ConnectionLost);
            return;
        }
        self.requests.lock().push(request.clone());

        let record = match &request {
            Request::Disconnect => {
                self.ensemble.sessions.lock().remove(&session_id);
                Response::Disconnect
            }
            other => self.ensemble.handler.handle(session_id, other),
        };
        let zxid = self.ensemble.next_zxid();
        let xid = self.next_xid.fetch_add(1, Ordering::Relaxed);
        self.publish(SessionEvent::ZxidObserved(zxid));
        if matches!(request, Request::Disconnect) {
            self.set_protocol(ProtocolState::Disconnected);
        }
        promise.send(Reply::new(xid, zxid, record));
    }

    fn subscribe(&self, listener: Arc<dyn SessionListener>) {
        self.listeners.subscribe(listener);
    }

    fn unsubscribe(&self, listener: &Arc<dyn SessionListener>) -> bool {
        self.listeners.unsubscribe(listener)
    }
}

#[async_trait]
impl ClientConnection for IntraVmConnection {
    fn address(&self) -> &ServerAddress {
        &self.address
    }

    async fn handshake(&self) -> ClientResult<HandshakeResult> {
        Ok(self.handshake.clone())
    }

    fn transport_state(&self) -> TransportState {
        *self.transport.lock()
    }

    fn protocol_state(&self) -> ProtocolState {
        *self.protocol.lock()
    }

    fn close(&self) {
        if self.transport_state() >= TransportState::Closing {
            return;
        }
        self.set_transport(TransportState::Closing);
        if !self.protocol_state().is_terminal() {
            self.set_protocol(ProtocolState::Disconnected);
        }
        self.set_transport(TransportState::Closed);
    }
}

impl fmt::Debug for IntraVmConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntraVmConnection")
            .field("id", &self.id)
            .field("address", &self.address.to_string())
            .field("transport", &self.transport_state())
            .field("protocol", &self.protocol_state())
            .finish()
    }
}
