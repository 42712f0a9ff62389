//! In-process replicated subscription store
//!
//! A [`MemoryCluster`] holds the shared entries. Each [`MemoryNode`] that joins
//! gets its own dispatch thread; every committed mutation, whichever node made
//! it, is queued to the dispatch thread of every running node while the commit
//! lock is held, so events for a key are seen in commit order everywhere.
//!
//! ```text
//!    node A put ──┐                         ┌──► [dispatch A] ──► listeners
//!                 ├──► Mutex<ClusterState> ─┤
//!    node B put ──┘   (caches + senders)    └──► [dispatch B] ──► listeners
//! ```
//!
//! A node can be partitioned (operations fail, no events received until healed)
//! or closed (permanently unavailable, dispatch thread exits).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use tokio::sync::mpsc;

use super::error::StoreError;
use super::event::{EventFilter, EventKind, ListenerHandle, MutationEvent, MutationListener};
use super::key::{ScanPredicate, SubscriptionKey};
use super::SubscriptionStore;

const RUNNING: u8 = 0;
const PARTITIONED: u8 = 1;
const CLOSED: u8 = 2;

/// Cluster-wide view of a node, held under the commit lock
struct NodeSlot {
    uid: u64,
    status: Arc<AtomicU8>,
    sender: mpsc::UnboundedSender<MutationEvent>,
}

#[derive(Default)]
struct ClusterState {
    caches: HashMap<String, BTreeMap<SubscriptionKey, bool>>,
    nodes: Vec<NodeSlot>,
}

impl ClusterState {
    fn publish(&self, event: MutationEvent) {
        for node in &self.nodes {
            if node.status.load(Ordering::Acquire) == RUNNING {
                // A closed receiver only means the node is going away
                let _ = node.sender.send(event.clone());
            }
        }
    }
}

#[derive(Default)]
struct ClusterShared {
    state: Mutex<ClusterState>,
    next_uid: AtomicU64,
}

/// Shared state of an in-process cluster
#[derive(Clone, Default)]
pub struct MemoryCluster {
    shared: Arc<ClusterShared>,
}

impl MemoryCluster {
    /// Create an empty cluster
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a new node to the cluster and start its dispatch thread
    pub fn join(&self, node_id: impl Into<String>) -> Result<MemoryNode, StoreError> {
        let node_id = node_id.into();
        let uid = self.shared.next_uid.fetch_add(1, Ordering::Relaxed);
        let status = Arc::new(AtomicU8::new(RUNNING));
        let listeners = Arc::new(Listeners::default());
        let (tx, mut rx) = mpsc::unbounded_channel::<MutationEvent>();

        let dispatch_listeners = Arc::clone(&listeners);
        let dispatch_node = node_id.clone();
        thread::Builder::new()
            .name(format!("subs-dispatch-{}", node_id))
            .spawn(move || {
                while let Some(event) = rx.blocking_recv() {
                    dispatch_listeners.dispatch(&event);
                }
                tracing::debug!(node_id = %dispatch_node, "Dispatch thread stopped");
            })
            .map_err(|e| StoreError::unavailable("cluster", e.to_string()))?;

        lock_state(&self.shared, "cluster")?.nodes.push(NodeSlot {
            uid,
            status: Arc::clone(&status),
            sender: tx,
        });

        tracing::info!(node_id = %node_id, "Node joined memory cluster");

        Ok(MemoryNode {
            inner: Arc::new(NodeInner {
                id: node_id,
                uid,
                cluster: Arc::clone(&self.shared),
                status,
                listeners,
            }),
        })
    }

    /// Number of nodes currently attached (running or partitioned)
    pub fn node_count(&self) -> usize {
        lock_state(&self.shared, "cluster")
            .map(|state| state.nodes.len())
            .unwrap_or(0)
    }
}

fn lock_state<'a>(
    shared: &'a ClusterShared,
    store: &str,
) -> Result<MutexGuard<'a, ClusterState>, StoreError> {
    shared
        .state
        .lock()
        .map_err(|_| StoreError::unavailable(store, "cluster state poisoned"))
}

struct ListenerEntry {
    id: u64,
    filter: EventFilter,
    listener: Arc<dyn MutationListener>,
}

#[derive(Default)]
struct Listeners {
    entries: Mutex<Vec<ListenerEntry>>,
    next_id: AtomicU64,
}

impl Listeners {
    fn add(
        &self,
        store: &str,
        filter: EventFilter,
        listener: Arc<dyn MutationListener>,
    ) -> Result<ListenerHandle, StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::unavailable(store, "listener registry poisoned"))?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        entries.push(ListenerEntry {
            id,
            filter,
            listener,
        });
        Ok(ListenerHandle::new(id))
    }

    fn remove(&self, id: u64) -> bool {
        match self.entries.lock() {
            Ok(mut entries) => {
                let before = entries.len();
                entries.retain(|entry| entry.id != id);
                entries.len() != before
            }
            Err(_) => false,
        }
    }

    fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    fn dispatch(&self, event: &MutationEvent) {
        // Listeners run without the lock held so they may (un)register freely
        let targets: Vec<Arc<dyn MutationListener>> = match self.entries.lock() {
            Ok(entries) => entries
                .iter()
                .filter(|entry| entry.filter.matches(event))
                .map(|entry| Arc::clone(&entry.listener))
                .collect(),
            Err(_) => return,
        };

        for listener in targets {
            let result =
                std::panic::catch_unwind(AssertUnwindSafe(|| listener.on_mutation(event)));
            if result.is_err() {
                tracing::warn!(
                    store = %event.store_name(),
                    key = %event.key(),
                    "Mutation listener panicked"
                );
            }
        }
    }
}

struct NodeInner {
    id: String,
    uid: u64,
    cluster: Arc<ClusterShared>,
    status: Arc<AtomicU8>,
    listeners: Arc<Listeners>,
}

impl NodeInner {
    fn check(&self, store: &str) -> Result<(), StoreError> {
        match self.status.load(Ordering::Acquire) {
            RUNNING => Ok(()),
            PARTITIONED => Err(StoreError::unavailable(store, "node partitioned")),
            _ => Err(StoreError::unavailable(store, "node closed")),
        }
    }

    fn detach(&self) {
        if let Ok(mut state) = self.cluster.state.lock() {
            state.nodes.retain(|slot| slot.uid != self.uid);
        }
    }
}

impl Drop for NodeInner {
    fn drop(&mut self) {
        self.detach();
    }
}

/// A member of a [`MemoryCluster`]
#[derive(Clone)]
pub struct MemoryNode {
    inner: Arc<NodeInner>,
}

impl MemoryNode {
    /// Node identifier
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Typed handle on a named cache of the cluster
    pub fn store(&self, name: &str) -> MemoryStore {
        MemoryStore {
            name: Arc::from(name),
            node: Arc::clone(&self.inner),
        }
    }

    /// Cut the node off: operations fail and no events arrive until healed
    pub fn partition(&self) {
        let _ = self.inner.status.compare_exchange(
            RUNNING,
            PARTITIONED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        tracing::info!(node_id = %self.inner.id, "Node partitioned");
    }

    /// Reconnect a partitioned node
    pub fn heal(&self) {
        let _ = self.inner.status.compare_exchange(
            PARTITIONED,
            RUNNING,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        tracing::info!(node_id = %self.inner.id, "Node healed");
    }

    /// Leave the cluster for good
    ///
    /// Every later operation fails, listeners are dropped and the dispatch
    /// thread exits once its queue is drained.
    pub fn close(&self) {
        self.inner.status.store(CLOSED, Ordering::Release);
        self.inner.detach();
        self.inner.listeners.clear();
        tracing::info!(node_id = %self.inner.id, "Node closed");
    }

    /// Whether the node can currently serve operations
    pub fn is_running(&self) -> bool {
        self.inner.status.load(Ordering::Acquire) == RUNNING
    }
}

/// [`SubscriptionStore`] backed by a named cache of a [`MemoryCluster`]
#[derive(Clone)]
pub struct MemoryStore {
    name: Arc<str>,
    node: Arc<NodeInner>,
}

impl MemoryStore {
    fn state(&self) -> Result<MutexGuard<'_, ClusterState>, StoreError> {
        self.node.check(&self.name)?;
        lock_state(&self.node.cluster, &self.name)
    }

    fn event(&self, key: SubscriptionKey, kind: EventKind) -> MutationEvent {
        MutationEvent::new(Arc::clone(&self.name), key, kind)
    }
}

impl SubscriptionStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn scan(&self, predicate: &ScanPredicate) -> Result<Vec<(SubscriptionKey, bool)>, StoreError> {
        let state = self.state()?;
        let entries = match state.caches.get(&*self.name) {
            Some(cache) => cache
                .iter()
                .filter(|(key, _)| predicate.matches(key))
                .map(|(key, value)| (key.clone(), *value))
                .collect(),
            None => Vec::new(),
        };
        Ok(entries)
    }

    fn put(&self, key: SubscriptionKey) -> Result<(), StoreError> {
        let mut state = self.state()?;
        state
            .caches
            .entry(self.name.to_string())
            .or_default()
            .insert(key.clone(), true);
        state.publish(self.event(key, EventKind::Put));
        Ok(())
    }

    fn remove(&self, key: &SubscriptionKey) -> Result<(), StoreError> {
        let mut state = self.state()?;
        let removed = state
            .caches
            .get_mut(&*self.name)
            .and_then(|cache| cache.remove(key))
            .is_some();
        if removed {
            state.publish(self.event(key.clone(), EventKind::Remove));
        }
        Ok(())
    }

    fn remove_all(&self, keys: &BTreeSet<SubscriptionKey>) -> Result<usize, StoreError> {
        let mut state = self.state()?;
        let removed: Vec<SubscriptionKey> = match state.caches.get_mut(&*self.name) {
            Some(cache) => keys
                .iter()
                .filter(|key| cache.remove(*key).is_some())
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        let count = removed.len();
        for key in removed {
            state.publish(self.event(key, EventKind::Remove));
        }
        Ok(count)
    }

    fn subscribe_mutations(
        &self,
        filter: EventFilter,
        listener: Arc<dyn MutationListener>,
    ) -> Result<ListenerHandle, StoreError> {
        self.node.check(&self.name)?;
        let handle = self.node.listeners.add(&self.name, filter, listener)?;
        tracing::debug!(
            node_id = %self.node.id,
            store = %self.name,
            listener = handle.id(),
            "Mutation listener registered"
        );
        Ok(handle)
    }

    fn unsubscribe_mutations(&self, handle: ListenerHandle) {
        if self.node.listeners.remove(handle.id()) {
            tracing::debug!(
                node_id = %self.node.id,
                store = %self.name,
                listener = handle.id(),
                "Mutation listener removed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::registration::RegistrationInfo;

    struct Recorder {
        tx: mpsc::UnboundedSender<MutationEvent>,
    }

    impl MutationListener for Recorder {
        fn on_mutation(&self, event: &MutationEvent) {
            let _ = self.tx.send(event.clone());
        }
    }

    fn recorder() -> (Arc<Recorder>, mpsc::UnboundedReceiver<MutationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Recorder { tx }), rx)
    }

    fn key(address: &str, node: &str, seq: u64) -> SubscriptionKey {
        SubscriptionKey::new(address, RegistrationInfo::new(node, seq))
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<MutationEvent>) -> MutationEvent {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event not delivered")
            .expect("dispatcher closed")
    }

    #[test]
    fn test_put_scan_remove() {
        let cluster = MemoryCluster::new();
        let node = cluster.join("n1").unwrap();
        let store = node.store("subs");

        assert_ok!(store.put(key("news", "n1", 1)));
        assert_ok!(store.put(key("news", "n1", 1)));
        assert_ok!(store.put(key("sports", "n1", 2)));

        let news = store.scan(&ScanPredicate::Address("news".into())).unwrap();
        assert_eq!(news.len(), 1);
        assert!(news[0].1);

        assert_ok!(store.remove(&key("news", "n1", 1)));
        assert_ok!(store.remove(&key("news", "n1", 1)));
        assert!(store
            .scan(&ScanPredicate::Address("news".into()))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_caches_are_isolated() {
        let cluster = MemoryCluster::new();
        let node = cluster.join("n1").unwrap();

        node.store("a").put(key("news", "n1", 1)).unwrap();

        let other = node.store("b");
        assert!(other
            .scan(&ScanPredicate::Node("n1".into()))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_entries_shared_across_nodes() {
        let cluster = MemoryCluster::new();
        let n1 = cluster.join("n1").unwrap();
        let n2 = cluster.join("n2").unwrap();

        n1.store("subs").put(key("news", "n1", 1)).unwrap();

        let seen = n2
            .store("subs")
            .scan(&ScanPredicate::Address("news".into()))
            .unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(cluster.node_count(), 2);
    }

    #[test]
    fn test_remove_all_counts_present_keys() {
        let cluster = MemoryCluster::new();
        let node = cluster.join("n1").unwrap();
        let store = node.store("subs");

        store.put(key("a", "n1", 1)).unwrap();
        store.put(key("b", "n1", 2)).unwrap();

        let keys: BTreeSet<_> = [key("a", "n1", 1), key("b", "n1", 2), key("c", "n1", 3)]
            .into_iter()
            .collect();
        assert_eq!(store.remove_all(&keys).unwrap(), 2);
        assert_eq!(store.remove_all(&keys).unwrap(), 0);
    }

    #[test]
    fn test_partitioned_node_is_unavailable() {
        let cluster = MemoryCluster::new();
        let node = cluster.join("n1").unwrap();
        let store = node.store("subs");

        node.partition();
        assert!(!node.is_running());
        assert_err!(store.scan(&ScanPredicate::Address("news".into())));
        assert_err!(store.put(key("news", "n1", 1)));
        assert_err!(store.remove(&key("news", "n1", 1)));
        assert_err!(store.remove_all(&BTreeSet::new()));

        node.heal();
        assert_ok!(store.put(key("news", "n1", 1)));
    }

    #[test]
    fn test_closed_node_detaches() {
        let cluster = MemoryCluster::new();
        let node = cluster.join("n1").unwrap();
        let store = node.store("subs");

        node.close();
        node.heal();

        let err = store.put(key("news", "n1", 1)).unwrap_err();
        assert_eq!(err, StoreError::unavailable("subs", "node closed"));
        assert_eq!(cluster.node_count(), 0);
    }

    #[tokio::test]
    async fn test_events_replicated_in_commit_order() {
        let cluster = MemoryCluster::new();
        let n1 = cluster.join("n1").unwrap();
        let n2 = cluster.join("n2").unwrap();
        let (rec1, mut rx1) = recorder();
        let (rec2, mut rx2) = recorder();

        let s1 = n1.store("subs");
        let s2 = n2.store("subs");
        s1.subscribe_mutations(EventFilter::all(), rec1).unwrap();
        s2.subscribe_mutations(EventFilter::all(), rec2).unwrap();

        s1.put(key("news", "n1", 1)).unwrap();
        s1.remove(&key("news", "n1", 1)).unwrap();
        // Absent key: nothing committed, nothing raised
        s1.remove(&key("news", "n1", 1)).unwrap();
        s2.put(key("news", "n2", 1)).unwrap();

        for rx in [&mut rx1, &mut rx2] {
            let kinds = [next(rx).await, next(rx).await, next(rx).await];
            assert_eq!(kinds[0].kind(), EventKind::Put);
            assert_eq!(kinds[1].kind(), EventKind::Remove);
            assert_eq!(kinds[2].kind(), EventKind::Put);
            assert_eq!(kinds[2].key(), &key("news", "n2", 1));
            assert_eq!(kinds[2].store_name(), "subs");
        }
    }

    #[tokio::test]
    async fn test_events_cover_every_cache_on_node() {
        let cluster = MemoryCluster::new();
        let node = cluster.join("n1").unwrap();
        let (rec, mut rx) = recorder();

        node.store("subs")
            .subscribe_mutations(EventFilter::all(), rec)
            .unwrap();
        node.store("other").put(key("news", "n1", 1)).unwrap();

        assert_eq!(next(&mut rx).await.store_name(), "other");
    }

    #[tokio::test]
    async fn test_filter_and_unsubscribe() {
        let cluster = MemoryCluster::new();
        let node = cluster.join("n1").unwrap();
        let store = node.store("subs");
        let (rec, mut rx) = recorder();

        let handle = store
            .subscribe_mutations(EventFilter::kinds(&[EventKind::Remove]), rec)
            .unwrap();

        store.put(key("news", "n1", 1)).unwrap();
        store.remove(&key("news", "n1", 1)).unwrap();
        assert_eq!(next(&mut rx).await.kind(), EventKind::Remove);

        store.unsubscribe_mutations(handle);
        store.put(key("news", "n1", 1)).unwrap();
        store.remove(&key("news", "n1", 1)).unwrap();

        // Listener dropped by the store, so the channel closes once drained
        let tail = timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert!(tail.is_none());
    }

    #[test]
    fn test_poisoned_listener_registry_rejects_subscribe() {
        let listeners = Listeners::default();
        let result = thread::scope(|s| {
            s.spawn(|| {
                let _entries = listeners.entries.lock().unwrap();
                panic!("poison listener registry");
            })
            .join()
        });
        assert!(result.is_err());

        let (rec, _rx) = recorder();
        let err = listeners.add("subs", EventFilter::all(), rec).unwrap_err();
        assert_eq!(
            err,
            StoreError::unavailable("subs", "listener registry poisoned")
        );
    }

    #[tokio::test]
    async fn test_panicking_listener_does_not_stop_dispatch() {
        struct Panics;
        impl MutationListener for Panics {
            fn on_mutation(&self, _event: &MutationEvent) {
                panic!("listener failure");
            }
        }

        let cluster = MemoryCluster::new();
        let node = cluster.join("n1").unwrap();
        let store = node.store("subs");
        let (rec, mut rx) = recorder();

        store
            .subscribe_mutations(EventFilter::all(), Arc::new(Panics))
            .unwrap();
        store.subscribe_mutations(EventFilter::all(), rec).unwrap();

        store.put(key("news", "n1", 1)).unwrap();
        store.put(key("news", "n1", 2)).unwrap();

        assert_eq!(next(&mut rx).await.key(), &key("news", "n1", 1));
        assert_eq!(next(&mut rx).await.key(), &key("news", "n1", 2));
    }
}
