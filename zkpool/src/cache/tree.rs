//! The cache trie and the executor wrapper that feeds it.

use std::collections::BTreeSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use zkpool_client::{ClientExecutor, ReplyPromise, ReplyResult, SessionListener, ZxidTracker};
use zkpool_core::{ErrorCode, Listeners, Reply, Request, Response, ZNodePath, Zxid};

use super::event::{CacheEvent, CacheListener, ViewKind};
use super::node::{CachedNode, Merge};
use crate::error::{CacheError, CacheResult};

/// Executor wrapper mirroring the nodes its traffic touches.
///
/// Every reply passing through [`submit`](ClientExecutor::submit) is folded
/// into the trie before the caller can observe it, so the cache is never
/// behind what the application has already seen. Only paths named by
/// requests or listed by `getChildren` replies are cached; this is not a
/// full mirror of the ensemble.
///
/// Each node keeps a stamp, the highest zxid it was observed at. Views
/// (data, ACL, stat) only move forward in zxid order and removals older
/// than the node's stamp are ignored, so replies may be applied in any
/// order.
pub struct TreeCache<E> {
    client: E,
    tree: Arc<Tree>,
}

struct Tree {
    root: Arc<CachedNode>,
    last_zxid: ZxidTracker,
    listeners: Listeners<dyn CacheListener>,
}

impl<E> TreeCache<E> {
    /// Wrap `client` with an empty cache.
    pub fn new(client: E) -> Self {
        Self {
            client,
            tree: Arc::new(Tree {
                root: Arc::new(CachedNode::new(ZNodePath::root())),
                last_zxid: ZxidTracker::new(),
                listeners: Listeners::new(),
            }),
        }
    }

    /// The wrapped executor.
    pub fn client(&self) -> &E {
        &self.client
    }

    /// The root node. Always present.
    pub fn root(&self) -> Arc<CachedNode> {
        self.tree.root.clone()
    }

    /// Cached node at `path`.
    pub fn get(&self, path: &ZNodePath) -> Option<Arc<CachedNode>> {
        self.tree.get(path)
    }

    /// Whether `path` is cached.
    pub fn contains(&self, path: &ZNodePath) -> bool {
        self.get(path).is_some()
    }

    /// Highest zxid of any reply folded in so far.
    pub fn last_zxid(&self) -> Zxid {
        self.tree.last_zxid.get()
    }

    /// Subscribe to cache changes.
    pub fn subscribe_cache(&self, listener: Arc<dyn CacheListener>) {
        self.tree.listeners.subscribe(listener);
    }

    /// Unsubscribe from cache changes. Returns whether it was subscribed.
    pub fn unsubscribe_cache(&self, listener: &Arc<dyn CacheListener>) -> bool {
        self.tree.listeners.unsubscribe(listener)
    }

    /// Fold a reply obtained elsewhere into the cache.
    pub fn observe(&self, request: &Request, reply: &Reply) {
        self.tree.observe(request, reply);
    }
}

impl<E: ClientExecutor> ClientExecutor for TreeCache<E> {
    fn submit_with(&self, request: Request, mut promise: ReplyPromise) {
        let tree = self.tree.clone();
        let observed = request.clone();
        promise.intercept(move |result| tree.handle_result(&observed, result));
        self.client.submit_with(request, promise);
    }

    fn subscribe(&self, listener: Arc<dyn SessionListener>) {
        self.client.subscribe(listener);
    }

    fn unsubscribe(&self, listener: &Arc<dyn SessionListener>) -> bool {
        self.client.unsubscribe(listener)
    }
}

impl<E: Clone> Clone for TreeCache<E> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            tree: self.tree.clone(),
        }
    }
}

impl<E: fmt::Debug> fmt::Debug for TreeCache<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeCache")
            .field("client", &self.client)
            .field("last_zxid", &self.last_zxid())
            .field("root", &self.tree.root)
            .finish()
    }
}

impl Tree {
    fn get(&self, path: &ZNodePath) -> Option<Arc<CachedNode>> {
        let mut node = self.root.clone();
        for label in path.components() {
            node = node.child(label)?;
        }
        Some(node)
    }

    fn handle_result(&self, request: &Request, result: &ReplyResult) {
        if let Ok(reply) = result {
            self.observe(request, reply);
        }
    }

    fn observe(&self, request: &Request, reply: &Reply) {
        self.last_zxid.update(reply.zxid);
        let mut events = Vec::new();
        if let Err(error) = self.apply(request, &reply.record, reply.zxid, &mut events) {
            tracing::warn!(
                opcode = ?request.opcode(),
                zxid = reply.zxid,
                %error,
                "reply not applied to cache"
            );
        }
        self.publish(events);
    }

    fn publish(&self, events: Vec<CacheEvent>) {
        if events.is_empty() {
            return;
        }
        let listeners = self.listeners.snapshot();
        for event in &events {
            tracing::trace!(?event, "cache event");
            for listener in &listeners {
                let delivered =
                    panic::catch_unwind(AssertUnwindSafe(|| listener.on_cache_event(event)));
                if delivered.is_err() {
                    tracing::error!(path = %event.path(), "cache listener panicked");
                }
            }
        }
    }

    fn apply(
        &self,
        request: &Request,
        response: &Response,
        zxid: Zxid,
        events: &mut Vec<CacheEvent>,
    ) -> CacheResult<()> {
        if let Response::Error(code) = response {
            return self.apply_error(request, *code, zxid, events);
        }

        match (request, response) {
            (
                Request::Create { data, acl, .. } | Request::Create2 { data, acl, .. },
                Response::Create { path } | Response::Create2 { path, .. },
            ) => {
                let node = self.add(path, zxid, events)?;
                let mut changes = vec![
                    (ViewKind::Data, node.merge_data(zxid, data.clone())),
                    (ViewKind::Acl, node.merge_acl(zxid, acl.clone())),
                ];
                if let Some(stat) = response.stat() {
                    changes.push((ViewKind::Stat, node.merge_stat(zxid, *stat)));
                }
                updated(&node, zxid, &changes, events);
            }
            (Request::Delete { path, .. }, Response::Delete) => self.remove(path, zxid, events),
            (Request::Exists { path, .. }, Response::Exists { stat }) => {
                let node = self.add(path, zxid, events)?;
                let changes = [(ViewKind::Stat, node.merge_stat(zxid, *stat))];
                updated(&node, zxid, &changes, events);
            }
            (Request::GetData { path, .. }, Response::GetData { data, stat })
            | (Request::SetData { path, data, .. }, Response::SetData { stat }) => {
                let node = self.add(path, zxid, events)?;
                let changes = [
                    (ViewKind::Data, node.merge_data(zxid, data.clone())),
                    (ViewKind::Stat, node.merge_stat(zxid, *stat)),
                ];
                updated(&node, zxid, &changes, events);
            }
            (Request::GetAcl { path }, Response::GetAcl { acl, stat })
            | (Request::SetAcl { path, acl, .. }, Response::SetAcl { stat }) => {
                let node = self.add(path, zxid, events)?;
                let changes = [
                    (ViewKind::Acl, node.merge_acl(zxid, acl.clone())),
                    (ViewKind::Stat, node.merge_stat(zxid, *stat)),
                ];
                updated(&node, zxid, &changes, events);
            }
            (Request::GetChildren { path, .. }, Response::GetChildren { children }) => {
                self.children(path, children, zxid, events)?;
            }
            (Request::GetChildren2 { path, .. }, Response::GetChildren2 { children, stat }) => {
                let node = self.children(path, children, zxid, events)?;
                let changes = [(ViewKind::Stat, node.merge_stat(zxid, *stat))];
                updated(&node, zxid, &changes, events);
            }
            (Request::Check { path, .. }, Response::Check) => {
                self.add(path, zxid, events)?;
            }
            (Request::Sync { .. }, Response::Sync { .. })
            | (Request::Disconnect, Response::Disconnect) => {}
            (Request::Multi(requests), Response::Multi(responses)) => {
                if requests.len() != responses.len() {
                    return Err(CacheError::malformed(
                        request.opcode(),
                        format!(
                            "{} operations but {} results",
                            requests.len(),
                            responses.len()
                        ),
                    ));
                }
                let mut first_error = None;
                for (request, response) in requests.iter().zip(responses) {
                    if let Err(error) = self.apply(request, response, zxid, events) {
                        first_error.get_or_insert(error);
                    }
                }
                if let Some(error) = first_error {
                    return Err(error);
                }
            }
            (request, response) => {
                return Err(CacheError::malformed(
                    request.opcode(),
                    format!("unexpected reply {response:?}"),
                ));
            }
        }
        Ok(())
    }

    fn apply_error(
        &self,
        request: &Request,
        code: ErrorCode,
        zxid: Zxid,
        events: &mut Vec<CacheEvent>,
    ) -> CacheResult<()> {
        match (request, code) {
            (Request::Create { path, .. } | Request::Create2 { path, .. }, ErrorCode::NoNode) => {
                if let Some(parent) = path.parent() {
                    self.remove(&parent, zxid, events);
                }
            }
            (
                Request::Delete { path, .. }
                | Request::Exists { path, .. }
                | Request::GetData { path, .. }
                | Request::GetAcl { path }
                | Request::GetChildren { path, .. }
                | Request::GetChildren2 { path, .. }
                | Request::SetData { path, .. }
                | Request::SetAcl { path, .. }
                | Request::Check { path, .. },
                ErrorCode::NoNode,
            ) => self.remove(path, zxid, events),
            (Request::Create { path, .. } | Request::Create2 { path, .. }, ErrorCode::NodeExists) => {
                self.add(path, zxid, events)?;
            }
            (request, code) => {
                tracing::trace!(opcode = ?request.opcode(), %code, "error reply leaves cache unchanged");
            }
        }
        Ok(())
    }

    /// Mark `path` and its ancestors present at `zxid`.
    fn add(
        &self,
        path: &ZNodePath,
        zxid: Zxid,
        events: &mut Vec<CacheEvent>,
    ) -> CacheResult<Arc<CachedNode>> {
        let mut node = self.root.clone();
        node.touch(zxid);
        for label in path.components() {
            let (child, created) = node.child_or_insert(label, zxid)?;
            if created {
                events.push(CacheEvent::NodeAdded {
                    path: child.path().clone(),
                    zxid,
                });
            }
            node = child;
        }
        Ok(node)
    }

    fn children(
        &self,
        path: &ZNodePath,
        labels: &[String],
        zxid: Zxid,
        events: &mut Vec<CacheEvent>,
    ) -> CacheResult<Arc<CachedNode>> {
        let node = self.add(path, zxid, events)?;
        for label in labels {
            let (child, created) = node.child_or_insert(label, zxid)?;
            if created {
                events.push(CacheEvent::NodeAdded {
                    path: child.path().clone(),
                    zxid,
                });
            }
        }
        for label in node.children() {
            if !labels.contains(&label) {
                self.detach(&node, &label, zxid, events);
            }
        }
        Ok(node)
    }

    /// Remove `path` and its subtree unless the node is newer than `zxid`.
    fn remove(&self, path: &ZNodePath, zxid: Zxid, events: &mut Vec<CacheEvent>) {
        let Some(parent) = path.parent().and_then(|parent| self.get(&parent)) else {
            return;
        };
        self.detach(&parent, path.label(), zxid, events);
    }

    fn detach(&self, parent: &CachedNode, label: &str, zxid: Zxid, events: &mut Vec<CacheEvent>) {
        match parent.remove_child(label, zxid) {
            Ok(Some(node)) => {
                events.extend(
                    node.subtree()
                        .into_iter()
                        .map(|path| CacheEvent::NodeRemoved { path, zxid }),
                );
            }
            Ok(None) => {}
            Err(stamp) => tracing::debug!(
                parent = %parent.path(),
                label,
                zxid,
                stamp,
                "ignoring stale removal"
            ),
        }
    }
}

/// Record one `NodeUpdated` for the views of `node` that changed.
fn updated(
    node: &CachedNode,
    zxid: Zxid,
    changes: &[(ViewKind, Merge)],
    events: &mut Vec<CacheEvent>,
) {
    let views: BTreeSet<_> = changes
        .iter()
        .filter(|(_, outcome)| *outcome == Merge::Changed)
        .map(|(view, _)| *view)
        .collect();
    if !views.is_empty() {
        events.push(CacheEvent::NodeUpdated {
            path: node.path().clone(),
            views,
            zxid,
        });
    }
}
