//! Error types for the storage ports.

use thiserror::Error;

/// Errors that can occur in storage operations.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// The store has been closed.
    #[error("Store is closed")]
    Closed,

    /// A backend-specific failure.
    #[error("Storage failure: {0}")]
    Backend(String),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;
