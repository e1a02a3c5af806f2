//! The cache on top of a live session.

use std::sync::Arc;
use std::time::Duration;

use zkpool::intravm::IntraVmConnector;
use zkpool::{
    CacheEvent, ClientExecutor, CustomProviders, Request, Response, SeededRandomProvider,
    SessionConfig, SessionExecutor, TokioTaskProvider, TokioTimeProvider, TreeCache, ViewKind,
};

use super::{create, get_children, get_data, path, recorded, set_data, MemoryStore};

fn cached_session(
    ensemble: &str,
) -> (
    IntraVmConnector,
    TreeCache<SessionExecutor<CustomProviders<TokioTimeProvider, TokioTaskProvider, SeededRandomProvider>>>,
) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_test_writer()
        .try_init();
    let store = MemoryStore::new();
    let connector =
        IntraVmConnector::with_handler(move |_session: i64, request: &Request| store.handle(request));
    let executor = SessionExecutor::new(
        ensemble.parse().expect("ensemble"),
        Arc::new(connector.clone()),
        CustomProviders::new(
            TokioTimeProvider::new(),
            TokioTaskProvider::new(),
            SeededRandomProvider::new(42),
        ),
        SessionConfig::new(Duration::from_secs(10)),
    );
    executor.start();
    (connector, TreeCache::new(executor))
}

#[tokio::test(start_paused = true)]
async fn test_replies_through_session_populate_cache() {
    let (connector, cache) = cached_session("a:2181,b:2181,c:2181");
    let events = recorded(&cache);

    cache.submit(create("/app", b"")).await.expect("reply");
    cache.submit(create("/app/config", b"v1")).await.expect("reply");
    let reply = cache.submit(get_children("/app")).await.expect("reply");
    assert_eq!(
        reply.record,
        Response::GetChildren {
            children: vec!["config".to_string()]
        }
    );

    let config = cache.get(&path("/app/config")).expect("cached");
    assert_eq!(config.data().map(|d| d.into_inner()), Some(b"v1".to_vec()));
    assert_eq!(cache.last_zxid(), connector.last_zxid());
    assert!(events
        .lock()
        .contains(&CacheEvent::NodeAdded { path: path("/app/config"), zxid: 2 }));
}

#[tokio::test(start_paused = true)]
async fn test_cache_keeps_following_after_failover() {
    let (connector, cache) = cached_session("a:2181,b:2181,c:2181");
    cache.submit(create("/svc", b"one")).await.expect("reply");
    let first = cache.client().ready().await.expect("ready").address().clone();

    connector.kill(&first);
    let events = recorded(&cache);
    cache.submit(set_data("/svc", b"two")).await.expect("reply");
    assert_ne!(cache.client().server(), Some(first));

    let svc = cache.get(&path("/svc")).expect("cached");
    assert_eq!(svc.data().map(|d| d.into_inner()), Some(b"two".to_vec()));
    assert!(events.lock().iter().any(|e| matches!(
        e,
        CacheEvent::NodeUpdated { views, .. } if views.contains(&ViewKind::Data)
    )));
    assert_eq!(cache.last_zxid(), connector.last_zxid());
}

#[tokio::test(start_paused = true)]
async fn test_missing_node_reply_evicts_and_is_returned() {
    let (_connector, cache) = cached_session("a:2181");
    cache.submit(create("/tmp", b"")).await.expect("reply");
    cache
        .submit(Request::Delete { path: path("/tmp"), version: -1 })
        .await
        .expect("reply");
    assert!(!cache.contains(&path("/tmp")));

    let reply = cache.submit(get_data("/tmp")).await.expect("reply");
    assert_eq!(reply.record.error(), Some(zkpool::ErrorCode::NoNode));
    assert!(!cache.contains(&path("/tmp")));
}

#[tokio::test(start_paused = true)]
async fn test_stopped_session_fails_requests_without_touching_cache() {
    let (_connector, cache) = cached_session("a:2181");
    cache.submit(create("/kept", b"")).await.expect("reply");
    let zxid = cache.last_zxid();
    cache.client().stop().await;

    assert!(cache.submit(get_data("/kept")).await.is_err());
    assert!(cache.contains(&path("/kept")));
    assert_eq!(cache.last_zxid(), zxid);
}
