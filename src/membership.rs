//! Cluster membership signals
//!
//! Discovery itself lives elsewhere; this module only reacts to nodes leaving
//! by purging their registrations from the directory.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::directory::SubscriptionDirectory;
use crate::store::SubscriptionStore;

/// Membership change reported by the discovery layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipEvent {
    /// A node joined the cluster
    NodeJoined(String),
    /// A node left the cluster or was declared failed
    NodeLeft(String),
}

/// Create the channel feeding [`spawn_membership_task`]
///
/// Capacity comes from the directory's `membership_buffer` setting.
pub fn membership_channel<S: SubscriptionStore>(
    directory: &SubscriptionDirectory<S>,
) -> (mpsc::Sender<MembershipEvent>, mpsc::Receiver<MembershipEvent>) {
    mpsc::channel(directory.config().membership_buffer.max(1))
}

/// Spawn a task that purges the registrations of every departed node
///
/// Each cleanup runs in its own task so a slow store never holds up the
/// membership stream. The task ends when every sender is dropped.
pub fn spawn_membership_task<S: SubscriptionStore>(
    directory: Arc<SubscriptionDirectory<S>>,
    mut events: mpsc::Receiver<MembershipEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                MembershipEvent::NodeJoined(node_id) => {
                    tracing::debug!(node_id = %node_id, "Node joined");
                }
                MembershipEvent::NodeLeft(node_id) => {
                    tracing::info!(node_id = %node_id, "Node left, purging its subscriptions");
                    let directory = Arc::clone(&directory);
                    tokio::spawn(async move {
                        directory.remove_all_for_node(&node_id).await;
                    });
                }
            }
        }
        tracing::debug!("Membership stream closed");
    })
}
