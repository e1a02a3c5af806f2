//! Relocation between ensemble members.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use zkpool_client::intravm::IntraVmConnector;
use zkpool_client::{
    ClientConnection, ClientError, ClientExecutor, ClientResult, Connector, SessionConfig,
    SessionExecutor, SessionListener,
};
use zkpool_core::{ConnectRequest, Response, ServerAddress, TransportState};

use super::{address, echo_connector, executor, get_data, providers, settle};

const ENSEMBLE: &str = "a:2181,b:2181,c:2181";

#[tokio::test(start_paused = true)]
async fn test_killed_connection_resumes_on_another_member() {
    let connector = echo_connector();
    let executor = executor(ENSEMBLE, &connector, 7);
    executor.start();

    let first = executor.ready().await.expect("ready");
    let first_server = first.address().clone();
    let session = executor.session().expect("session");
    let before = executor.submit(get_data("/warmup")).await.expect("reply");

    let lost_at = Instant::now();
    assert_eq!(connector.kill(&first_server), 1);
    let paths = ["/one", "/two", "/three"];
    let replies: Vec<_> = paths
        .iter()
        .map(|path| executor.submit(get_data(path)))
        .collect();
    let mut zxids = Vec::new();
    for (reply, path) in replies.into_iter().zip(paths) {
        let reply = reply.await.expect("reply after relocation");
        assert_eq!(
            reply.record,
            Response::GetData {
                data: path.as_bytes().to_vec(),
                stat: Default::default(),
            }
        );
        zxids.push(reply.zxid);
    }
    let elapsed = lost_at.elapsed();
    assert!(
        elapsed >= Duration::from_millis(1000) && elapsed <= Duration::from_millis(2000),
        "backoff {elapsed:?} outside the resume range"
    );
    assert!(zxids.windows(2).all(|w| w[0] < w[1]));

    let second_server = executor.server().expect("server");
    assert_ne!(second_server, first_server);
    let second = executor.ready().await.expect("ready");
    assert_eq!(second.address(), &second_server);

    let (resumed_on, resume) = connector.handshakes().last().cloned().expect("handshake");
    assert_eq!(resumed_on, second_server);
    assert_eq!(resume.session_id, session.id());
    assert_eq!(resume.password, session.password());
    assert!(resume.last_zxid_seen >= before.zxid);
    assert_eq!(executor.session().map(|s| s.id()), Some(session.id()));

    let logged = connector
        .last_connection(&second_server)
        .expect("connection")
        .requests();
    assert_eq!(logged, paths.iter().map(|p| get_data(p)).collect::<Vec<_>>());
    assert_eq!(executor.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_member_is_skipped_after_establishment() {
    let connector = echo_connector();
    let executor = executor(ENSEMBLE, &connector, 11);
    executor.start();

    let first = executor.ready().await.expect("ready").address().clone();
    let others: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(address)
        .filter(|a| *a != first)
        .collect();
    connector.set_reachable(&others[0], false);
    connector.set_reachable(&first, false);
    connector.kill(&first);

    let reply = executor.submit(get_data("/later")).await.expect("reply");
    assert_eq!(reply.zxid, connector.last_zxid());
    assert_eq!(executor.server(), Some(others[1].clone()));
    assert!(executor.attempts() >= 2);
}

#[tokio::test(start_paused = true)]
async fn test_single_member_loss_is_fatal() {
    let connector = echo_connector();
    let executor = executor("solo:2181", &connector, 3);
    executor.start();
    executor.ready().await.expect("ready");

    connector.kill(&address("solo"));
    let readiness = settle(&executor, |r| r.error().is_some()).await;
    assert_eq!(readiness.error(), Some(&ClientError::ConnectionLost));
    assert_eq!(executor.attempts(), 1);
    assert_eq!(connector.handshakes().len(), 1);
    assert_eq!(
        executor.submit(get_data("/after")).await,
        Err(ClientError::ConnectionLost)
    );
}

#[tokio::test(start_paused = true)]
async fn test_expired_session_is_replaced_without_backoff() {
    let connector = echo_connector();
    let executor = executor(ENSEMBLE, &connector, 5);
    executor.start();
    let first = executor.ready().await.expect("ready").address().clone();
    let expired = executor.session().expect("session");
    assert!(connector.expire_session(expired.id()));

    connector.kill(&first);
    let reply = executor.submit(get_data("/fresh")).await.expect("reply");
    assert_eq!(reply.zxid, connector.last_zxid());

    let handshakes = connector.handshakes();
    assert_eq!(handshakes.len(), 3);
    let (resume_on, resume) = &handshakes[1];
    let (fresh_on, fresh) = &handshakes[2];
    assert_eq!(resume.session_id, expired.id());
    assert!(fresh.is_new_session());
    assert_eq!(resume_on, fresh_on);

    let replacement = executor.session().expect("session");
    assert_ne!(replacement.id(), expired.id());

    // Once a session was rejected the executor no longer resumes.
    let lost_at = Instant::now();
    connector.kill(fresh_on);
    executor.submit(get_data("/again")).await.expect("reply");
    assert_eq!(lost_at.elapsed(), Duration::ZERO);
    let (_, last) = connector.handshakes().last().cloned().expect("handshake");
    assert!(last.is_new_session());
}

#[tokio::test(start_paused = true)]
async fn test_resumed_handshake_carries_highest_zxid() {
    let connector = echo_connector();
    let executor = executor(ENSEMBLE, &connector, 13);
    executor.start();
    let first = executor.ready().await.expect("ready").address().clone();
    for path in ["/a", "/b", "/c"] {
        executor.submit(get_data(path)).await.expect("reply");
    }
    let highest = connector.last_zxid();
    assert_eq!(executor.ensemble().tracker().get(), highest);

    connector.kill(&first);
    executor.submit(get_data("/d")).await.expect("reply");
    let (_, resume) = connector.handshakes().last().cloned().expect("handshake");
    assert_eq!(resume.last_zxid_seen, highest);
}

/// Connector whose `nth` connection is already closed when it is handed out.
struct ClosedOnArrival {
    inner: IntraVmConnector,
    made: AtomicUsize,
    nth: usize,
}

#[async_trait]
impl Connector for ClosedOnArrival {
    async fn connect(
        &self,
        address: &ServerAddress,
        request: ConnectRequest,
        observer: Arc<dyn SessionListener>,
    ) -> ClientResult<Arc<dyn ClientConnection>> {
        let connection = self.inner.connect(address, request, observer).await?;
        if self.made.fetch_add(1, Ordering::SeqCst) + 1 == self.nth {
            connection.close();
        }
        Ok(connection)
    }
}

#[tokio::test(start_paused = true)]
async fn test_connection_closed_before_handover_is_relocated() {
    let connector = echo_connector();
    let executor = SessionExecutor::new(
        ENSEMBLE.parse().expect("ensemble"),
        Arc::new(ClosedOnArrival {
            inner: connector.clone(),
            made: AtomicUsize::new(0),
            nth: 2,
        }),
        providers(17),
        SessionConfig::new(Duration::from_secs(10)),
    );
    executor.start();
    let first = executor.ready().await.expect("ready").address().clone();
    let session = executor.session().expect("session");

    connector.kill(&first);
    let reply = executor
        .submit(get_data("/after"))
        .await
        .expect("served once a live connection is found");
    assert_eq!(reply.zxid, connector.last_zxid());

    assert_eq!(executor.attempts(), 3);
    let serving = executor.ready().await.expect("ready");
    assert_eq!(serving.transport_state(), TransportState::Opened);
    assert_eq!(executor.session().map(|s| s.id()), Some(session.id()));
    let dead = &connector.connections()[1];
    assert_eq!(dead.transport_state(), TransportState::Closed);
    assert!(dead.requests().is_empty());
}
