//! Store error types

/// Error type for subscription store operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store cannot serve reads or writes right now (closing, partitioned, ...)
    Unavailable {
        /// Name of the backing store
        store: String,
        /// Why the store refused the operation
        reason: String,
    },
}

impl StoreError {
    /// Create an unavailable error
    pub fn unavailable(store: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::Unavailable {
            store: store.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Unavailable { store, reason } => {
                write!(f, "Store {} unavailable: {}", store, reason)
            }
        }
    }
}

impl std::error::Error for StoreError {}
