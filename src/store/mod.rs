//! Subscription store adapter
//!
//! Typed facade over the replicated key/value store that holds the
//! subscription entries. The store is the single source of truth for the
//! directory: every entry maps a [`SubscriptionKey`] to a presence marker.
//!
//! All operations may block on network or replication I/O, so callers in
//! async code must run them on a blocking-capable thread.
//!
//! [`memory`] provides an in-process clustered implementation.

pub mod error;
pub mod event;
pub mod key;
pub mod memory;

use std::collections::BTreeSet;

pub use error::StoreError;
pub use event::{EventFilter, EventKind, ListenerHandle, MutationEvent, MutationListener};
pub use key::{ScanPredicate, SubscriptionKey};

/// Name of the cache that holds event bus subscriptions
pub const DEFAULT_CACHE_NAME: &str = "__bus.subs";

/// Replicated key/value store holding subscription entries
pub trait SubscriptionStore: Send + Sync + 'static {
    /// Name of the backing cache, as reported on mutation events
    fn name(&self) -> &str;

    /// Return every entry matching the predicate
    ///
    /// Fails with [`StoreError::Unavailable`] when the store is not operable;
    /// that is never reported as an empty result.
    fn scan(&self, predicate: &ScanPredicate) -> Result<Vec<(SubscriptionKey, bool)>, StoreError>;

    /// Upsert the presence marker for `key` (idempotent)
    fn put(&self, key: SubscriptionKey) -> Result<(), StoreError>;

    /// Delete `key`; deleting an absent key succeeds
    fn remove(&self, key: &SubscriptionKey) -> Result<(), StoreError>;

    /// Best-effort bulk delete
    ///
    /// Returns how many entries were actually removed. Partial removal is not
    /// an error; `Err` means the store could not be reached at all.
    fn remove_all(&self, keys: &BTreeSet<SubscriptionKey>) -> Result<usize, StoreError>;

    /// Register a listener for committed mutations
    ///
    /// The listener runs on a dispatch thread owned by the store, once per
    /// committed mutation passing `filter`. Events for the same key arrive in
    /// commit order.
    fn subscribe_mutations(
        &self,
        filter: EventFilter,
        listener: std::sync::Arc<dyn MutationListener>,
    ) -> Result<ListenerHandle, StoreError>;

    /// Deregister a listener
    ///
    /// No event is dispatched to it after this returns, apart from one that
    /// was already being delivered.
    fn unsubscribe_mutations(&self, handle: ListenerHandle);
}
