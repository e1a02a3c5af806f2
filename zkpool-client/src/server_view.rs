//! Per-member connection factory.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use zkpool_core::{ConnectRequest, ServerAddress, Session};

use crate::connection::{ClientConnection, Connector, SessionListener};
use crate::error::ClientResult;
use crate::zxid::{ZxidListener, ZxidTracker};

/// Builds connections to one ensemble member.
///
/// Every handshake carries the shared tracker's high-water mark, and every
/// connection produced feeds the zxids it observes back into the tracker.
#[derive(Clone)]
pub struct ServerViewFactory {
    address: ServerAddress,
    connector: Arc<dyn Connector>,
    tracker: ZxidTracker,
    timeout: Duration,
}

impl ServerViewFactory {
    /// Factory for `address` using `connector`.
    pub fn new(
        address: ServerAddress,
        connector: Arc<dyn Connector>,
        tracker: ZxidTracker,
        timeout: Duration,
    ) -> Self {
        Self {
            address,
            connector,
            tracker,
            timeout,
        }
    }

    /// Member this factory connects to.
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// Shared zxid tracker.
    pub fn tracker(&self) -> &ZxidTracker {
        &self.tracker
    }

    /// Connect and request a brand-new session.
    pub async fn get(&self) -> ClientResult<Arc<dyn ClientConnection>> {
        let request = ConnectRequest::new_session(self.timeout, self.tracker.get());
        self.connect(request).await
    }

    /// Connect and try to resume `session`.
    pub async fn get_session(&self, session: &Session) -> ClientResult<Arc<dyn ClientConnection>> {
        let request = ConnectRequest::resume(session, self.tracker.get());
        self.connect(request).await
    }

    async fn connect(&self, request: ConnectRequest) -> ClientResult<Arc<dyn ClientConnection>> {
        tracing::debug!(
            server = %self.address,
            new_session = request.is_new_session(),
            last_zxid_seen = request.last_zxid_seen,
            "connecting"
        );
        let observer: Arc<dyn SessionListener> = Arc::new(ZxidListener::new(self.tracker.clone()));
        self.connector.connect(&self.address, request, observer).await
    }
}

impl fmt::Debug for ServerViewFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerViewFactory")
            .field("address", &self.address)
            .field("last_zxid", &self.tracker.get())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use zkpool_core::{HandshakeResult, Request, Response, ZNodePath};

    use super::*;
    use crate::connection::ClientExecutor;
    use crate::intravm::IntraVmConnector;

    fn factory(connector: &IntraVmConnector, tracker: ZxidTracker) -> ServerViewFactory {
        ServerViewFactory::new(
            ServerAddress::new("a", 2181),
            Arc::new(connector.clone()),
            tracker,
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_handshake_carries_tracked_zxid() {
        let connector = IntraVmConnector::new();
        let factory = factory(&connector, ZxidTracker::with_initial(41));
        factory.get().await.expect("connect");

        let (address, request) = connector.handshakes().pop().expect("handshake");
        assert_eq!(&address, factory.address());
        assert!(request.is_new_session());
        assert_eq!(request.last_zxid_seen, 41);
        assert_eq!(request.timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_connections_feed_the_tracker() {
        let connector = IntraVmConnector::with_handler(|_session: i64, _request: &Request| {
            Response::Sync {
                path: ZNodePath::root(),
            }
        });
        let tracker = ZxidTracker::new();
        let factory = factory(&connector, tracker.clone());
        let connection = factory.get().await.expect("connect");

        let reply = connection
            .submit(Request::Sync {
                path: ZNodePath::root(),
            })
            .await
            .expect("reply");
        assert_eq!(tracker.get(), reply.zxid);
        assert_eq!(factory.tracker().get(), reply.zxid);
    }

    #[tokio::test]
    async fn test_handshake_zxid_reaches_tracker() {
        let connector = IntraVmConnector::with_handler(|_session: i64, _request: &Request| {
            Response::Sync {
                path: ZNodePath::root(),
            }
        });
        let busy = factory(&connector, ZxidTracker::new())
            .get()
            .await
            .expect("connect");
        for _ in 0..3 {
            busy.submit(Request::Sync {
                path: ZNodePath::root(),
            })
            .await
            .expect("reply");
        }

        let tracker = ZxidTracker::new();
        factory(&connector, tracker.clone()).get().await.expect("connect");
        assert_eq!(tracker.get(), connector.last_zxid());
    }

    #[tokio::test]
    async fn test_get_session_resumes() {
        let connector = IntraVmConnector::new();
        let factory = factory(&connector, ZxidTracker::new());
        let first = factory.get().await.expect("connect");
        let session = match first.handshake().await.expect("handshake") {
            HandshakeResult::Valid(session) => session,
            HandshakeResult::Invalid => panic!("new session must be valid"),
        };

        let resumed = factory.get_session(&session).await.expect("connect");
        assert_eq!(
            resumed.handshake().await.expect("handshake"),
            HandshakeResult::Valid(session.clone())
        );
        let (_, request) = connector.handshakes().pop().expect("handshake");
        assert_eq!(request.session_id, session.id());
    }
}
