//! Session executor integration tests.
//!
//! Runs the executor against the in-process transport with tokio's clock
//! paused, so the resumption backoff elapses instantly but measurably.

use std::sync::Arc;
use std::time::Duration;

use zkpool_client::intravm::IntraVmConnector;
use zkpool_client::{Readiness, SessionConfig, SessionExecutor};
use zkpool_core::{
    CustomProviders, ErrorCode, Request, Response, SeededRandomProvider, ServerAddress, Stat,
    TokioTaskProvider, TokioTimeProvider, ZNodePath,
};

#[path = "session/failover.rs"]
mod failover;
#[path = "session/lifecycle.rs"]
mod lifecycle;

type TestProviders = CustomProviders<TokioTimeProvider, TokioTaskProvider, SeededRandomProvider>;

fn providers(seed: u64) -> TestProviders {
    CustomProviders::new(
        TokioTimeProvider::new(),
        TokioTaskProvider::new(),
        SeededRandomProvider::new(seed),
    )
}

/// Connector answering `GetData` with the requested path as data.
fn echo_connector() -> IntraVmConnector {
    IntraVmConnector::with_handler(|_session: i64, request: &Request| match request {
        Request::GetData { path, .. } => Response::GetData {
            data: path.as_str().as_bytes().to_vec(),
            stat: Stat::default(),
        },
        _ => Response::Error(ErrorCode::Unimplemented),
    })
}

fn executor(
    ensemble: &str,
    connector: &IntraVmConnector,
    seed: u64,
) -> SessionExecutor<TestProviders> {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_test_writer()
        .try_init();
    SessionExecutor::new(
        ensemble.parse().expect("ensemble"),
        Arc::new(connector.clone()),
        providers(seed),
        SessionConfig::new(Duration::from_secs(10)),
    )
}

fn get_data(path: &str) -> Request {
    Request::GetData {
        path: ZNodePath::new(path).expect("path"),
        watch: false,
    }
}

fn address(host: &str) -> ServerAddress {
    ServerAddress::new(host, 2181)
}

/// Poll readiness until `accept` holds, advancing the paused clock.
async fn settle<F>(executor: &SessionExecutor<TestProviders>, accept: F) -> Readiness
where
    F: Fn(&Readiness) -> bool,
{
    for _ in 0..10_000 {
        let readiness = executor.readiness();
        if accept(&readiness) {
            return readiness;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("readiness never settled: {:?}", executor.readiness());
}
