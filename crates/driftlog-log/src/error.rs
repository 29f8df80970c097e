//! Error types for the operation log.

use driftlog_entry::EntryError;
use driftlog_store::StoreError;
use thiserror::Error;

/// Errors that can occur in log operations.
#[derive(Error, Debug)]
pub enum LogError {
    /// Attempted to join entries or logs belonging to a different log.
    #[error("Log ids do not match: expected \"{local}\", was given \"{other}\"")]
    LogIdMismatch { local: String, other: String },

    /// The access controller rejected the writing key.
    #[error("Could not append entry:\nKey \"{0}\" is not allowed to write to the log")]
    AccessDenied(String),

    /// The entry's signature does not verify against its key.
    #[error("Could not validate signature for entry \"{0}\"")]
    SignatureInvalid(String),

    /// A referenced entry is not present in storage.
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// Entry construction or decoding failed.
    #[error(transparent)]
    Entry(#[from] EntryError),

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for log operations.
pub type Result<T> = std::result::Result<T, LogError>;
