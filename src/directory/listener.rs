//! Mutation event pipeline
//!
//! Runs on the store's dispatch thread, so it does nothing but filter and hand
//! the address to a worker task. The worker re-reads the full registration set
//! for the address and pushes it to the node selector.

use std::sync::{Arc, Weak};

use crate::registration::RegistrationUpdate;
use crate::store::{MutationEvent, MutationListener, SubscriptionStore};

use super::store::Shared;

/// Listener registered with the store for the lifetime of a directory
pub(super) struct DirectoryListener<S: SubscriptionStore> {
    shared: Weak<Shared<S>>,
}

impl<S: SubscriptionStore> DirectoryListener<S> {
    pub(super) fn new(shared: Weak<Shared<S>>) -> Self {
        Self { shared }
    }
}

impl<S: SubscriptionStore> MutationListener for DirectoryListener<S> {
    fn on_mutation(&self, event: &MutationEvent) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };

        // The node dispatcher reports mutations of every cache it hosts
        if event.store_name() != shared.store.name() {
            shared.metrics.event_ignored();
            tracing::trace!(
                store = %event.store_name(),
                key = %event.key(),
                "Ignoring event from another cache"
            );
            return;
        }

        shared.metrics.event_received();
        if !shared.is_alive() {
            return;
        }

        let address = event.key().address().to_owned();
        tracing::debug!(
            address = %address,
            kind = ?event.kind(),
            "Subscription changed, scheduling re-query"
        );

        let runtime = shared.runtime.clone();
        runtime.spawn(requery(shared, address));
    }
}

/// Re-read an address and push the snapshot to the node selector
async fn requery<S: SubscriptionStore>(shared: Arc<Shared<S>>, address: String) {
    // Closed on shutdown: queued re-queries are dropped
    let Ok(_permit) = Arc::clone(&shared.workers).acquire_owned().await else {
        shared.metrics.notification_suppressed();
        tracing::trace!(address = %address, "Directory shut down, re-query discarded");
        return;
    };

    match shared.get(address.clone()).await {
        Ok(registrations) => {
            let count = registrations.len();
            if shared.deliver(RegistrationUpdate::new(address.clone(), registrations)) {
                shared.metrics.notification_delivered();
                tracing::debug!(
                    address = %address,
                    registrations = count,
                    "Pushed registration update"
                );
            } else {
                shared.metrics.notification_suppressed();
                tracing::trace!(address = %address, "Directory shut down, update suppressed");
            }
        }
        Err(e) => {
            shared.metrics.requery_failed();
            tracing::warn!(
                address = %address,
                error = %e,
                "Failed to re-query subscriptions after change"
            );
        }
    }
}
