//! Directory configuration

pub use crate::store::DEFAULT_CACHE_NAME;

/// Configuration for a [`SubscriptionDirectory`](super::SubscriptionDirectory)
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// Maximum number of event-triggered re-queries running at once
    pub requery_concurrency: usize,

    /// Capacity of the node-left signal queue consumed by the membership task
    pub membership_buffer: usize,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            requery_concurrency: 16,
            membership_buffer: 64,
        }
    }
}

impl DirectoryConfig {
    /// Set the re-query concurrency (at least 1)
    pub fn requery_concurrency(mut self, limit: usize) -> Self {
        self.requery_concurrency = limit.max(1);
        self
    }

    /// Set the membership signal queue capacity (at least 1)
    pub fn membership_buffer(mut self, capacity: usize) -> Self {
        self.membership_buffer = capacity.max(1);
        self
    }
}
