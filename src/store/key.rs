//! Entry key for the subscription store
//!
//! Each stored entry is keyed by the address it listens on plus the
//! registration that listens.

use crate::registration::RegistrationInfo;

/// Unique identifier for a subscription entry (address + registration)
///
/// Ordering is address first, then registration. It only exists so bulk
/// removals can be built as a sorted, duplicate-free set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey {
    address: String,
    registration: RegistrationInfo,
}

impl SubscriptionKey {
    /// Create a new subscription key
    pub fn new(address: impl Into<String>, registration: RegistrationInfo) -> Self {
        Self {
            address: address.into(),
            registration,
        }
    }

    /// Event bus address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Registration listening on the address
    pub fn registration(&self) -> &RegistrationInfo {
        &self.registration
    }

    /// Consume the key, keeping only the registration
    pub fn into_registration(self) -> RegistrationInfo {
        self.registration
    }
}

impl std::fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.address, self.registration)
    }
}

/// Selects entries during a store scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanPredicate {
    /// Entries whose address equals the value
    Address(String),
    /// Entries whose registration lives on the node
    Node(String),
}

impl ScanPredicate {
    /// Check whether a key passes the predicate
    pub fn matches(&self, key: &SubscriptionKey) -> bool {
        match self {
            ScanPredicate::Address(address) => key.address() == address,
            ScanPredicate::Node(node_id) => key.registration().node_id() == node_id,
        }
    }
}
