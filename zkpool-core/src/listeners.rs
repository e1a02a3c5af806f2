//! Listener registry shared by publishers.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

/// Set of subscribed listeners, compared by identity.
///
/// Publishing iterates a snapshot so listeners may subscribe or unsubscribe
/// from inside a callback.
pub struct Listeners<L: ?Sized> {
    inner: RwLock<Vec<Arc<L>>>,
}

impl<L: ?Sized> Listeners<L> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Vec::new()),
        }
    }

    /// Add a listener. Subscribing the same `Arc` twice is a no-op.
    pub fn subscribe(&self, listener: Arc<L>) {
        let mut inner = self.inner.write();
        if !inner.iter().any(|l| same(l, &listener)) {
            inner.push(listener);
        }
    }

    /// Remove a listener. Returns whether it was subscribed.
    pub fn unsubscribe(&self, listener: &Arc<L>) -> bool {
        let mut inner = self.inner.write();
        let before = inner.len();
        inner.retain(|l| !same(l, listener));
        inner.len() != before
    }

    /// Current listeners.
    pub fn snapshot(&self) -> Vec<Arc<L>> {
        self.inner.read().clone()
    }

    /// Number of listeners.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether nobody is subscribed.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Remove every listener.
    pub fn clear(&self) {
        self.inner.write().clear();
    }
}

fn same<L: ?Sized>(a: &Arc<L>, b: &Arc<L>) -> bool {
    // data pointers only; vtables are not unique
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl<L: ?Sized> Default for Listeners<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ?Sized> fmt::Debug for Listeners<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("len", &self.len())
            .finish()
    }
}
