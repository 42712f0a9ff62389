//! Directory error types

use crate::store::StoreError;

/// Error type for directory operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// The backing store failed the operation
    Unavailable(StoreError),
    /// The blocking task running the store call panicked or was cancelled
    WorkerFailed(String),
    /// The directory was built outside a tokio runtime
    NoRuntime,
}

impl std::fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DirectoryError::Unavailable(e) => write!(f, "Subscription directory unavailable: {}", e),
            DirectoryError::WorkerFailed(reason) => {
                write!(f, "Subscription directory worker failed: {}", reason)
            }
            DirectoryError::NoRuntime => write!(f, "No tokio runtime available"),
        }
    }
}

impl std::error::Error for DirectoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DirectoryError::Unavailable(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for DirectoryError {
    fn from(e: StoreError) -> Self {
        DirectoryError::Unavailable(e)
    }
}
