//! Mutation events raised by the store
//!
//! The store delivers one event per committed put or remove, on its own
//! dispatch thread, to every registered [`MutationListener`] whose filter
//! accepts it.

use std::sync::Arc;

use super::key::SubscriptionKey;

/// Kind of committed mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// An entry was inserted or overwritten
    Put,
    /// An entry was removed
    Remove,
}

/// A committed mutation on a named store
#[derive(Debug, Clone)]
pub struct MutationEvent {
    store_name: Arc<str>,
    key: SubscriptionKey,
    kind: EventKind,
}

impl MutationEvent {
    /// Create a new event
    pub fn new(store_name: Arc<str>, key: SubscriptionKey, kind: EventKind) -> Self {
        Self {
            store_name,
            key,
            kind,
        }
    }

    /// Name of the store that committed the mutation
    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    /// Key that was mutated
    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    /// Kind of mutation
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

/// Selects which event kinds a listener receives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventFilter {
    puts: bool,
    removes: bool,
}

impl EventFilter {
    /// Accept puts and removes
    pub fn all() -> Self {
        Self {
            puts: true,
            removes: true,
        }
    }

    /// Accept only the given kinds
    pub fn kinds(kinds: &[EventKind]) -> Self {
        Self {
            puts: kinds.contains(&EventKind::Put),
            removes: kinds.contains(&EventKind::Remove),
        }
    }

    /// Check whether an event passes the filter
    pub fn matches(&self, event: &MutationEvent) -> bool {
        match event.kind() {
            EventKind::Put => self.puts,
            EventKind::Remove => self.removes,
        }
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// Receives mutation events on the store's dispatch thread
///
/// Implementations must return quickly and never block: a slow listener stalls
/// event delivery for every other listener on the node.
pub trait MutationListener: Send + Sync + 'static {
    /// Called once per committed mutation accepted by the listener's filter
    fn on_mutation(&self, event: &MutationEvent);
}

/// Capability returned by a listener registration
///
/// Give it back to [`unsubscribe_mutations`](super::SubscriptionStore::unsubscribe_mutations)
/// to stop deliveries. Not `Clone`: a registration is cancelled exactly once.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ListenerHandle {
    id: u64,
}

impl ListenerHandle {
    /// Create a handle from a store-assigned id
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    /// Store-assigned id
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::RegistrationInfo;

    fn event(kind: EventKind) -> MutationEvent {
        MutationEvent::new(
            Arc::from("subs"),
            SubscriptionKey::new("news", RegistrationInfo::new("n1", 1)),
            kind,
        )
    }

    #[test]
    fn test_filter_all() {
        let filter = EventFilter::default();
        assert!(filter.matches(&event(EventKind::Put)));
        assert!(filter.matches(&event(EventKind::Remove)));
    }

    #[test]
    fn test_filter_kinds() {
        let filter = EventFilter::kinds(&[EventKind::Remove]);
        assert!(!filter.matches(&event(EventKind::Put)));
        assert!(filter.matches(&event(EventKind::Remove)));
    }
}
