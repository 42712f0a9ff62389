//! Subscription directory
//!
//! Maps event bus addresses to the registrations listening on them, across the
//! whole cluster, and keeps the local node selector informed.
//!
//! # Architecture
//!
//! ```text
//!    caller ──► get / put / remove ──► spawn_blocking ──► SubscriptionStore
//!                                                               │
//!                                          MutationEvent (dispatch thread)
//!                                                               ▼
//!                                                      DirectoryListener
//!                                                     (filter by cache name)
//!                                                               │ spawn
//!                                                               ▼
//!                         Semaphore ──► re-query get(address) ──► NodeSelector
//! ```
//!
//! # Consistency
//!
//! Each mutation event triggers a full re-query of its address, so every
//! update the selector receives is a complete snapshot. Re-queries for one
//! address are not sequenced: two updates may arrive in the opposite order of
//! the mutations that triggered them. The next mutation on the address always
//! brings the selector back in line.

pub mod config;
pub mod error;
mod listener;
pub mod store;

pub use config::{DirectoryConfig, DEFAULT_CACHE_NAME};
pub use error::DirectoryError;
pub use store::SubscriptionDirectory;
