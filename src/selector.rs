//! Node selector interface
//!
//! The node selector turns registration sets into routing decisions for
//! outbound messages. The directory only ever pushes to it.

use crate::registration::RegistrationUpdate;

/// Consumer of address-level registration updates
///
/// Called from worker tasks, possibly concurrently, and for the same address
/// possibly out of the order the underlying mutations happened. Each update is
/// a complete snapshot and replaces whatever was known for the address.
pub trait NodeSelector: Send + Sync + 'static {
    /// The registration set for `update.address` changed
    fn registrations_updated(&self, update: RegistrationUpdate);
}
