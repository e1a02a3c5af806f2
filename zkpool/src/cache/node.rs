//! Cached nodes and stamped views.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use zkpool_core::{Acl, PathResult, Stat, ZNodePath, Zxid};

/// A value together with the zxid it was observed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamped<T> {
    stamp: Zxid,
    value: T,
}

impl<T> Stamped<T> {
    /// Stamp `value` with `stamp`.
    pub fn new(stamp: Zxid, value: T) -> Self {
        Self { stamp, value }
    }

    /// Zxid the value was observed at.
    pub fn stamp(&self) -> Zxid {
        self.stamp
    }

    /// The value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Take the value.
    pub fn into_inner(self) -> T {
        self.value
    }
}

/// Outcome of merging a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Merge {
    /// Older than what is cached; ignored.
    Stale,
    /// Same value, newer stamp.
    Refreshed,
    /// First value, or a different one.
    Changed,
}

/// Merge `value` observed at `zxid` into `slot`.
pub(crate) fn merge<T: PartialEq>(slot: &mut Option<Stamped<T>>, zxid: Zxid, value: T) -> Merge {
    match slot {
        Some(previous) if previous.stamp > zxid => Merge::Stale,
        Some(previous) => {
            let outcome = if previous.value == value {
                Merge::Refreshed
            } else {
                Merge::Changed
            };
            *previous = Stamped::new(zxid, value);
            outcome
        }
        None => {
            *slot = Some(Stamped::new(zxid, value));
            Merge::Changed
        }
    }
}

#[derive(Default)]
struct NodeState {
    stamp: Option<Zxid>,
    children: BTreeMap<String, Arc<CachedNode>>,
    data: Option<Stamped<Vec<u8>>>,
    acl: Option<Stamped<Vec<Acl>>>,
    stat: Option<Stamped<Stat>>,
}

/// One node of the cache trie.
///
/// Every node carries its own lock, so replies touching different paths
/// never contend. Locks are always taken parent before child.
pub struct CachedNode {
    path: ZNodePath,
    state: Mutex<NodeState>,
}

impl CachedNode {
    pub(crate) fn new(path: ZNodePath) -> Self {
        Self {
            path,
            state: Mutex::new(NodeState::default()),
        }
    }

    /// Path of this node.
    pub fn path(&self) -> &ZNodePath {
        &self.path
    }

    /// Highest zxid at which the node was observed, `None` if never.
    pub fn stamp(&self) -> Option<Zxid> {
        self.state.lock().stamp
    }

    /// Cached data.
    pub fn data(&self) -> Option<Stamped<Vec<u8>>> {
        self.state.lock().data.clone()
    }

    /// Cached ACL.
    pub fn acl(&self) -> Option<Stamped<Vec<Acl>>> {
        self.state.lock().acl.clone()
    }

    /// Cached stat.
    pub fn stat(&self) -> Option<Stamped<Stat>> {
        self.state.lock().stat.clone()
    }

    /// Labels of the cached children, sorted.
    pub fn children(&self) -> Vec<String> {
        self.state.lock().children.keys().cloned().collect()
    }

    /// Cached child by label.
    pub fn child(&self, label: &str) -> Option<Arc<CachedNode>> {
        self.state.lock().children.get(label).cloned()
    }

    /// Raise the stamp to `zxid`. Returns the previous stamp.
    pub(crate) fn touch(&self, zxid: Zxid) -> Option<Zxid> {
        let mut state = self.state.lock();
        let previous = state.stamp;
        state.stamp = Some(previous.map_or(zxid, |s| s.max(zxid)));
        previous
    }

    /// Child `label` observed at `zxid`, created if absent. The flag tells
    /// whether it was created.
    ///
    /// The child's stamp is raised while this node is still locked, so a
    /// concurrent older removal can never detach it in between.
    pub(crate) fn child_or_insert(
        &self,
        label: &str,
        zxid: Zxid,
    ) -> PathResult<(Arc<CachedNode>, bool)> {
        let mut state = self.state.lock();
        if let Some(child) = state.children.get(label) {
            child.touch(zxid);
            return Ok((child.clone(), false));
        }
        let child = Arc::new(CachedNode::new(self.path.join(label)?));
        child.touch(zxid);
        state.children.insert(label.to_string(), child.clone());
        Ok((child, true))
    }

    /// Detach child `label` if its stamp is not newer than `zxid`.
    ///
    /// `Err` carries the child's stamp when the removal is stale.
    pub(crate) fn remove_child(
        &self,
        label: &str,
        zxid: Zxid,
    ) -> Result<Option<Arc<CachedNode>>, Zxid> {
        let mut state = self.state.lock();
        let stamp = match state.children.get(label) {
            Some(child) => child.stamp(),
            None => return Ok(None),
        };
        match stamp {
            Some(stamp) if stamp > zxid => Err(stamp),
            _ => Ok(state.children.remove(label)),
        }
    }

    /// Paths of this node and every cached descendant, parents first.
    pub(crate) fn subtree(&self) -> Vec<ZNodePath> {
        let mut paths = vec![self.path.clone()];
        let children: Vec<_> = self.state.lock().children.values().cloned().collect();
        for child in children {
            paths.extend(child.subtree());
        }
        paths
    }

    pub(crate) fn merge_data(&self, zxid: Zxid, data: Vec<u8>) -> Merge {
        merge(&mut self.state.lock().data, zxid, data)
    }

    pub(crate) fn merge_acl(&self, zxid: Zxid, acl: Vec<Acl>) -> Merge {
        merge(&mut self.state.lock().acl, zxid, acl)
    }

    pub(crate) fn merge_stat(&self, zxid: Zxid, stat: Stat) -> Merge {
        merge(&mut self.state.lock().stat, zxid, stat)
    }
}

impl fmt::Debug for CachedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CachedNode")
            .field("path", &self.path)
            .field("stamp", &state.stamp)
            .field("children", &state.children.keys().collect::<Vec<_>>())
            .field("data", &state.data.as_ref().map(|d| (d.stamp, d.value.len())))
            .field("stat", &state.stat.as_ref().map(Stamped::stamp))
            .finish()
    }
}
