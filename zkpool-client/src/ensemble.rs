//! Ensemble-wide member selection and factory memoization.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use zkpool_core::{EnsembleView, RandomProvider, ServerAddress};

use crate::connection::Connector;
use crate::error::{ClientError, ClientResult};
use crate::server_view::ServerViewFactory;
use crate::zxid::ZxidTracker;

/// Maps ensemble members to memoized [`ServerViewFactory`]s.
///
/// All factories share one [`ZxidTracker`], so a fail-over to any member
/// requests at least the highest zxid seen on any earlier connection.
pub struct EnsembleViewFactory<R: RandomProvider> {
    view: EnsembleView,
    connector: Arc<dyn Connector>,
    random: R,
    timeout: Duration,
    tracker: ZxidTracker,
    factories: DashMap<ServerAddress, Arc<ServerViewFactory>>,
}

impl<R: RandomProvider> EnsembleViewFactory<R> {
    /// Create a factory over `view`.
    pub fn new(
        view: EnsembleView,
        connector: Arc<dyn Connector>,
        random: R,
        timeout: Duration,
    ) -> Self {
        Self {
            view,
            connector,
            random,
            timeout,
            tracker: ZxidTracker::new(),
            factories: DashMap::new(),
        }
    }

    /// The configured members.
    pub fn view(&self) -> &EnsembleView {
        &self.view
    }

    /// Shared zxid tracker.
    pub fn tracker(&self) -> &ZxidTracker {
        &self.tracker
    }

    /// Draw one member uniformly at random.
    pub fn select(&self) -> ServerAddress {
        let members = self.view.members();
        members[self.random.random_range(0..members.len())].clone()
    }

    /// Draw a member different from `previous`, redrawing until it differs.
    ///
    /// Returns `None` when no other member exists.
    pub fn select_other(&self, previous: &ServerAddress) -> Option<ServerAddress> {
        if !self.view.iter().any(|member| member != previous) {
            return None;
        }
        loop {
            let candidate = self.select();
            if &candidate != previous {
                return Some(candidate);
            }
        }
    }

    /// The factory for `address`, created on first use.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotInEnsemble`] when `address` is not a member.
    pub fn get(&self, address: &ServerAddress) -> ClientResult<Arc<ServerViewFactory>> {
        if !self.view.contains(address) {
            return Err(ClientError::NotInEnsemble(address.clone()));
        }
        let factory = self
            .factories
            .entry(address.clone())
            .or_insert_with(|| {
                tracing::trace!(server = %address, "creating server view factory");
                Arc::new(ServerViewFactory::new(
                    address.clone(),
                    self.connector.clone(),
                    self.tracker.clone(),
                    self.timeout,
                ))
            })
            .clone();
        Ok(factory)
    }
}

impl<R: RandomProvider> fmt::Debug for EnsembleViewFactory<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnsembleViewFactory")
            .field("view", &self.view.to_string())
            .field("factories", &self.factories.len())
            .field("last_zxid", &self.tracker.get())
            .finish()
    }
}
