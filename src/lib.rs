//! Subscription directory for a clustered event bus
//!
//! Tracks, across all nodes of a cluster, which registrations are listening on
//! each event bus address, and pushes the full registration set for an address
//! to the local [`NodeSelector`] whenever that set changes.
//!
//! # Architecture
//!
//! ```text
//!   put / remove / get (async)            replicated store
//!  ─────────────────────────►  Directory ──────────────────► SubscriptionStore
//!                                  ▲                               │
//!                                  │ re-query (blocking pool)      │ MutationEvent
//!                                  │                               ▼
//!                             [worker task] ◄── spawn ── listener (dispatch thread)
//!                                  │
//!                                  ▼
//!                     NodeSelector::registrations_updated()
//! ```
//!
//! Every mutation event triggers a fresh query of the whole address instead of
//! patching a local replica, so each notification is a consistent snapshot.

pub mod directory;
pub mod membership;
pub mod registration;
pub mod selector;
pub mod stats;
pub mod store;

pub use directory::{DirectoryConfig, DirectoryError, SubscriptionDirectory};
pub use membership::{membership_channel, spawn_membership_task, MembershipEvent};
pub use registration::{RegistrationInfo, RegistrationUpdate};
pub use selector::NodeSelector;
pub use stats::DirectoryStats;
pub use store::{
    EventFilter, EventKind, ListenerHandle, MutationEvent, MutationListener, ScanPredicate,
    StoreError, SubscriptionKey, SubscriptionStore,
};
