//! Session fail-over across an in-process ensemble.
//!
//! Connects to a three-member ensemble, writes a few nodes through a
//! [`TreeCache`], kills the member serving the session and keeps writing.
//! The session is resumed on another member and the cache follows along.
//!
//! ```text
//! cargo run -p zkpool --example ensemble_failover
//! ```

use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Arc;

use parking_lot::Mutex;
use zkpool::intravm::IntraVmConnector;
use zkpool::prelude::*;

/// Flat key/value answers, enough to drive the demo.
fn kv_handler() -> impl Fn(i64, &Request) -> Response + Send + Sync + 'static {
    let nodes: Mutex<BTreeMap<ZNodePath, Vec<u8>>> = Mutex::new(BTreeMap::new());
    move |_session: i64, request: &Request| {
        let mut nodes = nodes.lock();
        match request {
            Request::Create { path, data, .. } => {
                if nodes.insert(path.clone(), data.clone()).is_some() {
                    return Response::Error(ErrorCode::NodeExists);
                }
                Response::Create { path: path.clone() }
            }
            Request::SetData { path, data, .. } => match nodes.get_mut(path) {
                Some(current) => {
                    *current = data.clone();
                    Response::SetData {
                        stat: Stat {
                            data_length: data.len() as i32,
                            ..Stat::default()
                        },
                    }
                }
                None => Response::Error(ErrorCode::NoNode),
            },
            Request::GetData { path, .. } => match nodes.get(path) {
                Some(data) => Response::GetData {
                    data: data.clone(),
                    stat: Stat {
                        data_length: data.len() as i32,
                        ..Stat::default()
                    },
                },
                None => Response::Error(ErrorCode::NoNode),
            },
            _ => Response::Error(ErrorCode::Unimplemented),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    let connector = IntraVmConnector::with_handler(kv_handler());
    let executor = SessionExecutor::new(
        "zk1:2181,zk2:2181,zk3:2181".parse()?,
        Arc::new(connector.clone()),
        TokioProviders::new(),
        SessionConfig::local_network(),
    );
    executor.start();

    let cache = TreeCache::new(executor.clone());
    cache.subscribe_cache(Arc::new(|event: &CacheEvent| {
        tracing::info!(?event, "cache changed");
    }));

    let connection = executor.ready().await?;
    let serving = connection.address().clone();
    tracing::info!(server = %serving, session = ?executor.session(), "connected");

    let path: ZNodePath = "/demo".parse()?;
    cache
        .submit(Request::Create {
            path: path.clone(),
            data: b"before".to_vec(),
            acl: Acl::open_unsafe(),
            mode: CreateMode::Persistent,
        })
        .await?;

    tracing::info!(server = %serving, "killing the serving member");
    connector.kill(&serving);

    cache
        .submit(Request::SetData {
            path: path.clone(),
            data: b"after".to_vec(),
            version: -1,
        })
        .await?;
    let reply = cache
        .submit(Request::GetData {
            path: path.clone(),
            watch: false,
        })
        .await?;
    tracing::info!(
        server = ?executor.server().map(|s| s.to_string()),
        zxid = reply.zxid,
        attempts = executor.attempts(),
        "resumed"
    );

    if let Some(node) = cache.get(&path) {
        let data = node.data().map(Stamped::into_inner).unwrap_or_default();
        println!(
            "{} = {:?} at zxid {:?}",
            node.path(),
            String::from_utf8_lossy(&data),
            node.stamp()
        );
    }

    executor.stop().await;
    Ok(())
}
