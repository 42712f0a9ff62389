//! Subscription directory implementation
//!
//! Address-level queries and mutations over the replicated store, plus the
//! listener that turns store mutation events into node selector updates.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::runtime::Handle;
use tokio::sync::Semaphore;

use crate::registration::{RegistrationInfo, RegistrationUpdate};
use crate::selector::NodeSelector;
use crate::stats::{DirectoryMetrics, DirectoryStats};
use crate::store::{
    EventFilter, ListenerHandle, ScanPredicate, StoreError, SubscriptionKey, SubscriptionStore,
};

use super::config::DirectoryConfig;
use super::error::DirectoryError;
use super::listener::DirectoryListener;

/// State shared between the directory and its event listener
pub(super) struct Shared<S: SubscriptionStore> {
    pub(super) store: Arc<S>,
    pub(super) selector: Arc<dyn NodeSelector>,
    pub(super) runtime: Handle,
    pub(super) workers: Arc<Semaphore>,
    pub(super) metrics: DirectoryMetrics,
    alive: AtomicBool,
    /// Held shared while the selector is being called, exclusively by shutdown
    delivery: RwLock<()>,
}

impl<S: SubscriptionStore> Shared<S> {
    pub(super) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Push an update to the selector unless the directory has shut down
    ///
    /// Returns whether the selector was called.
    pub(super) fn deliver(&self, update: RegistrationUpdate) -> bool {
        let _gate = self
            .delivery
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !self.is_alive() {
            return false;
        }
        self.selector.registrations_updated(update);
        true
    }

    /// Run a store call on the blocking pool
    async fn blocking<T, F>(&self, op: F) -> Result<T, DirectoryError>
    where
        F: FnOnce(&S) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        match self.runtime.spawn_blocking(move || op(store.as_ref())).await {
            Ok(result) => result.map_err(DirectoryError::Unavailable),
            Err(e) => Err(DirectoryError::WorkerFailed(e.to_string())),
        }
    }

    pub(super) async fn get(
        &self,
        address: String,
    ) -> Result<Vec<RegistrationInfo>, DirectoryError> {
        let entries = self
            .blocking(move |store| store.scan(&ScanPredicate::Address(address)))
            .await?;

        Ok(entries
            .into_iter()
            .map(|(key, _)| key.into_registration())
            .collect())
    }
}

/// Cluster-wide map from event bus address to registrations
///
/// The store is the only source of truth; the directory keeps nothing but the
/// listener registration. Dropping the directory shuts it down.
pub struct SubscriptionDirectory<S: SubscriptionStore> {
    shared: Arc<Shared<S>>,
    listener: Mutex<Option<ListenerHandle>>,
    config: DirectoryConfig,
}

impl<S: SubscriptionStore> SubscriptionDirectory<S> {
    /// Create a directory with default configuration
    ///
    /// Must be called from within a tokio runtime; worker tasks are spawned on it.
    pub fn new(store: S, selector: Arc<dyn NodeSelector>) -> Result<Self, DirectoryError> {
        Self::with_config(store, selector, DirectoryConfig::default())
    }

    /// Create a directory with custom configuration
    ///
    /// Registers the mutation listener with the store.
    pub fn with_config(
        store: S,
        selector: Arc<dyn NodeSelector>,
        config: DirectoryConfig,
    ) -> Result<Self, DirectoryError> {
        let runtime = Handle::try_current().map_err(|_| DirectoryError::NoRuntime)?;

        let shared = Arc::new(Shared {
            store: Arc::new(store),
            selector,
            runtime,
            workers: Arc::new(Semaphore::new(config.requery_concurrency.max(1))),
            metrics: DirectoryMetrics::default(),
            alive: AtomicBool::new(true),
            delivery: RwLock::new(()),
        });

        let listener = Arc::new(DirectoryListener::new(Arc::downgrade(&shared)));
        let handle = shared
            .store
            .subscribe_mutations(EventFilter::all(), listener)?;

        tracing::info!(
            store = %shared.store.name(),
            listener = handle.id(),
            "Subscription directory started"
        );

        Ok(Self {
            shared,
            listener: Mutex::new(Some(handle)),
            config,
        })
    }

    /// Get the directory configuration
    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Get the backing store
    pub fn store(&self) -> &S {
        &self.shared.store
    }

    /// Whether the directory still forwards changes to the node selector
    pub fn is_active(&self) -> bool {
        self.shared.is_alive()
    }

    /// Snapshot of the pipeline counters
    pub fn stats(&self) -> DirectoryStats {
        self.shared.metrics.snapshot()
    }

    /// All registrations currently listening on `address` (unordered)
    pub async fn get(&self, address: &str) -> Result<Vec<RegistrationInfo>, DirectoryError> {
        self.shared.get(address.to_owned()).await
    }

    /// Register `registration` on `address`
    ///
    /// Completes once the local store accepted the write; replication to the
    /// rest of the cluster happens afterwards.
    pub async fn put(
        &self,
        address: &str,
        registration: RegistrationInfo,
    ) -> Result<(), DirectoryError> {
        let key = SubscriptionKey::new(address, registration);
        tracing::debug!(subscription = %key, "Adding subscription");
        self.shared.blocking(move |store| store.put(key)).await
    }

    /// Unregister `registration` from `address`
    ///
    /// Succeeds when the entry was already gone.
    pub async fn remove(
        &self,
        address: &str,
        registration: RegistrationInfo,
    ) -> Result<(), DirectoryError> {
        let key = SubscriptionKey::new(address, registration);
        tracing::debug!(subscription = %key, "Removing subscription");
        self.shared.blocking(move |store| store.remove(&key)).await
    }

    /// Remove every registration of a node that left the cluster
    ///
    /// Never fails: store errors are logged and counted. Stale entries may
    /// stay visible until the store converges.
    ///
    /// The returned future runs the scan and bulk removal to completion.
    /// Callers reacting to membership changes should spawn it rather than
    /// await it inline, as [`spawn_membership_task`](crate::spawn_membership_task) does.
    pub async fn remove_all_for_node(&self, node_id: &str) {
        self.shared.metrics.cleanup_started();

        let node = node_id.to_owned();
        let result = self
            .shared
            .blocking(move |store| {
                let keys: BTreeSet<SubscriptionKey> = store
                    .scan(&ScanPredicate::Node(node))?
                    .into_iter()
                    .map(|(key, _)| key)
                    .collect();
                let removed = store.remove_all(&keys)?;
                Ok((keys.len(), removed))
            })
            .await;

        match result {
            Ok((found, removed)) => {
                self.shared.metrics.entries_cleaned(removed);
                tracing::info!(
                    node_id = %node_id,
                    found = found,
                    removed = removed,
                    "Removed subscriptions of departed node"
                );
            }
            Err(e) => {
                self.shared.metrics.cleanup_failed();
                tracing::warn!(
                    node_id = %node_id,
                    error = %e,
                    "Failed to remove subscriptions of departed node"
                );
            }
        }
    }

    /// Stop forwarding changes and deregister the store listener
    ///
    /// Call before the node leaves the cluster. Re-queries still queued are
    /// discarded and those already running do not reach the node selector.
    /// If the selector is being called when shutdown starts, shutdown waits
    /// for that call to return; no call starts after shutdown returns.
    /// Must not be called from inside the selector callback.
    /// Calling it again does nothing.
    pub fn shutdown(&self) {
        if !self.shared.alive.swap(false, Ordering::AcqRel) {
            return;
        }

        self.shared.workers.close();
        drop(
            self.shared
                .delivery
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );

        let handle = match self.listener.lock() {
            Ok(mut listener) => listener.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            self.shared.store.unsubscribe_mutations(handle);
        }

        tracing::info!(store = %self.shared.store.name(), "Subscription directory shut down");
    }
}

impl<S: SubscriptionStore> Drop for SubscriptionDirectory<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
