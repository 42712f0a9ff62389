//! Registration types
//!
//! A registration identifies one handler on one node. The directory never looks
//! inside it beyond its identity.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// A handler registered on some node of the cluster
///
/// Equality, hashing and ordering only consider `(node_id, seq)`; the
/// `local_only` flag is carried along but is not part of the identity.
#[derive(Debug, Clone)]
pub struct RegistrationInfo {
    node_id: String,
    seq: u64,
    local_only: bool,
}

impl RegistrationInfo {
    /// Create a clustered registration
    pub fn new(node_id: impl Into<String>, seq: u64) -> Self {
        Self {
            node_id: node_id.into(),
            seq,
            local_only: false,
        }
    }

    /// Create a registration for a handler that only accepts local messages
    pub fn local(node_id: impl Into<String>, seq: u64) -> Self {
        Self {
            local_only: true,
            ..Self::new(node_id, seq)
        }
    }

    /// Node hosting the handler
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Registration sequence number, unique per node
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Whether the handler is local-only (not reachable from other nodes)
    pub fn is_local_only(&self) -> bool {
        self.local_only
    }
}

impl PartialEq for RegistrationInfo {
    fn eq(&self, other: &Self) -> bool {
        self.node_id == other.node_id && self.seq == other.seq
    }
}

impl Eq for RegistrationInfo {}

impl Hash for RegistrationInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.node_id.hash(state);
        self.seq.hash(state);
    }
}

impl PartialOrd for RegistrationInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RegistrationInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        self.node_id
            .cmp(&other.node_id)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl std::fmt::Display for RegistrationInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.node_id, self.seq)
    }
}

/// Full registration set for an address, pushed to the node selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationUpdate {
    /// Event bus address
    pub address: String,
    /// Every registration currently known for the address (unordered)
    pub registrations: Vec<RegistrationInfo>,
}

impl RegistrationUpdate {
    /// Create a new update
    pub fn new(address: impl Into<String>, registrations: Vec<RegistrationInfo>) -> Self {
        Self {
            address: address.into(),
            registrations,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_identity_ignores_local_flag() {
        let clustered = RegistrationInfo::new("node-a", 7);
        let local = RegistrationInfo::local("node-a", 7);

        assert_eq!(clustered, local);

        let mut set = HashSet::new();
        set.insert(clustered);
        assert!(!set.insert(local));
    }

    #[test]
    fn test_ordering_node_then_seq() {
        let mut regs = vec![
            RegistrationInfo::new("node-b", 1),
            RegistrationInfo::new("node-a", 9),
            RegistrationInfo::new("node-a", 2),
        ];
        regs.sort();

        assert_eq!(regs[0].to_string(), "node-a#2");
        assert_eq!(regs[1].to_string(), "node-a#9");
        assert_eq!(regs[2].to_string(), "node-b#1");
    }

    #[test]
    fn test_local_constructor() {
        let reg = RegistrationInfo::local("node-a", 3);
        assert!(reg.is_local_only());
        assert_eq!(reg.node_id(), "node-a");
        assert_eq!(reg.seq(), 3);
        assert!(!RegistrationInfo::new("node-a", 3).is_local_only());
    }
}
