//! Start, cancel, stop and event relaying.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use zkpool_client::{ClientError, ClientExecutor, ReplyPromise, SessionEvent, SessionListener};
use zkpool_core::{ProtocolState, Request, TransportState, WatchEvent, WatchedEventType, ZNodePath};

use super::{address, echo_connector, executor, get_data, settle};

#[tokio::test(start_paused = true)]
async fn test_first_attempt_failure_is_not_retried() {
    let connector = echo_connector();
    for host in ["a", "b", "c"] {
        connector.set_reachable(&address(host), false);
    }
    let executor = executor("a:2181,b:2181,c:2181", &connector, 1);
    let queued = executor.submit(get_data("/early"));
    executor.start();

    assert_eq!(executor.ready().await.err(), Some(ClientError::ConnectionLost));
    assert_eq!(queued.await, Err(ClientError::ConnectionLost));
    assert_eq!(executor.attempts(), 1);
    assert!(connector.handshakes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_requests_queued_before_start_are_flushed_in_order() {
    let connector = echo_connector();
    let executor = executor("a:2181", &connector, 1);
    let first = executor.submit(get_data("/1"));
    let second = executor.submit(get_data("/2"));
    executor.start();
    executor.start();

    let first = first.await.expect("reply");
    let second = second.await.expect("reply");
    assert!(first.zxid < second.zxid);
    assert_eq!(executor.attempts(), 1);
    let logged = connector
        .last_connection(&address("a"))
        .expect("connection")
        .requests();
    assert_eq!(logged, vec![get_data("/1"), get_data("/2")]);
}

#[tokio::test(start_paused = true)]
async fn test_stop_closes_session_gracefully() {
    let connector = echo_connector();
    let executor = executor("a:2181", &connector, 1);
    executor.start();
    let connection = executor.ready().await.expect("ready");
    let session = executor.session().expect("session");
    executor.submit(get_data("/x")).await.expect("reply");

    executor.stop().await;

    let raw = connector.last_connection(&address("a")).expect("connection");
    assert_eq!(raw.requests().last(), Some(&Request::Disconnect));
    assert_eq!(connection.transport_state(), TransportState::Closed);
    assert_eq!(connection.protocol_state(), ProtocolState::Disconnected);
    assert!(!connector.has_session(session.id()));

    assert_eq!(
        executor.submit(get_data("/y")).await,
        Err(ClientError::Stopped)
    );
    assert_eq!(executor.ready().await.err(), Some(ClientError::Stopped));
    executor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_before_start_fails_queued_requests() {
    let connector = echo_connector();
    let executor = executor("a:2181", &connector, 1);
    let queued = executor.submit(get_data("/never"));
    executor.stop().await;
    executor.start();

    assert_eq!(queued.await, Err(ClientError::Stopped));
    assert!(connector.connections().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_relocation_fails_with_cancelled() {
    let connector = echo_connector();
    let executor = executor("a:2181,b:2181", &connector, 9);
    executor.start();
    let first = executor.ready().await.expect("ready").address().clone();

    connector.kill(&first);
    let waiting = executor.submit(get_data("/gap"));
    executor.cancel();

    assert_eq!(waiting.await, Err(ClientError::Cancelled));
    assert_eq!(executor.ready().await.err(), Some(ClientError::Cancelled));
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(connector.handshakes().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_keeps_established_session_until_loss() {
    let connector = echo_connector();
    let executor = executor("a:2181,b:2181", &connector, 9);
    executor.start();
    let first = executor.ready().await.expect("ready").address().clone();

    executor.cancel();
    executor.submit(get_data("/still")).await.expect("reply");
    assert!(executor.readiness().is_ready());

    connector.kill(&first);
    let readiness = settle(&executor, |r| r.error().is_some()).await;
    assert_eq!(readiness.error(), Some(&ClientError::Cancelled));
    assert_eq!(connector.handshakes().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_request_is_not_forwarded_to_live_session() {
    let connector = echo_connector();
    let executor = executor("a:2181", &connector, 3);
    executor.start();
    executor.ready().await.expect("ready");

    let (promise, future) = ReplyPromise::new();
    drop(future);
    executor.submit_with(get_data("/abandoned"), promise);
    executor.submit(get_data("/kept")).await.expect("reply");

    let logged = connector
        .last_connection(&address("a"))
        .expect("connection")
        .requests();
    assert_eq!(logged, vec![get_data("/kept")]);
}

#[tokio::test(start_paused = true)]
async fn test_listeners_follow_the_session_across_members() {
    let connector = echo_connector();
    let executor = executor("a:2181,b:2181", &connector, 21);
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let listener: Arc<dyn SessionListener> = Arc::new(move |event: &SessionEvent| {
        sink.lock().push(event.clone());
    });
    executor.subscribe(listener.clone());
    executor.start();

    let first = executor.ready().await.expect("ready").address().clone();
    let id = executor.session().expect("session").id();
    let created = WatchEvent {
        event_type: WatchedEventType::NodeCreated,
        path: ZNodePath::new("/watched").expect("path"),
    };
    connector.notify(id, created.clone());
    wait_until(|| events.lock().contains(&SessionEvent::Notification(created.clone()))).await;

    connector.kill(&first);
    executor.submit(get_data("/moved")).await.expect("reply");
    wait_until(|| {
        events.lock().contains(&SessionEvent::TransportChanged {
            from: TransportState::Closing,
            to: TransportState::Closed,
        })
    })
    .await;

    let deleted = WatchEvent {
        event_type: WatchedEventType::NodeDeleted,
        path: ZNodePath::new("/watched").expect("path"),
    };
    connector.notify(id, deleted.clone());
    wait_until(|| events.lock().contains(&SessionEvent::Notification(deleted.clone()))).await;

    assert!(executor.unsubscribe(&listener));
    assert!(!executor.unsubscribe(&listener));
}

async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition never held");
}
