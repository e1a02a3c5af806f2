//! Process-wide zxid high-water mark.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use zkpool_core::Zxid;

use crate::connection::{SessionEvent, SessionListener};

/// Highest zxid observed on any connection to one ensemble.
///
/// Clones share the same value. Updates only ever move it forward, so a
/// reconnect to any member can ask for at least everything this process
/// has already seen.
#[derive(Clone, Debug, Default)]
pub struct ZxidTracker {
    last: Arc<AtomicI64>,
}

impl ZxidTracker {
    /// Tracker starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker starting at `zxid`.
    pub fn with_initial(zxid: Zxid) -> Self {
        Self {
            last: Arc::new(AtomicI64::new(zxid)),
        }
    }

    /// Current high-water mark.
    pub fn get(&self) -> Zxid {
        self.last.load(Ordering::Acquire)
    }

    /// Raise the mark to `zxid`. Returns whether it moved.
    pub fn update(&self, zxid: Zxid) -> bool {
        self.last.fetch_max(zxid, Ordering::AcqRel) < zxid
    }
}

/// Listener feeding observed zxids into a [`ZxidTracker`].
#[derive(Clone, Debug)]
pub struct ZxidListener {
    tracker: ZxidTracker,
}

impl ZxidListener {
    /// Listener updating `tracker`.
    pub fn new(tracker: ZxidTracker) -> Self {
        Self { tracker }
    }
}

impl SessionListener for ZxidListener {
    fn on_event(&self, event: &SessionEvent) {
        if let SessionEvent::ZxidObserved(zxid) = event {
            if self.tracker.update(*zxid) {
                tracing::trace!(zxid = *zxid, "zxid advanced");
            }
        }
    }
}
