//! Error types for entry construction and decoding.

use thiserror::Error;

/// Errors that can occur when building, encoding or decoding entries.
#[derive(Error, Debug, Clone)]
pub enum EntryError {
    /// The identity cannot sign (no signing key attached).
    #[error("Identity is required, the identity provided cannot sign")]
    IdentityRequired,

    /// An entry requires a non-empty log id.
    #[error("Entry requires an id")]
    MissingLogId,

    /// An entry requires a non-empty payload.
    #[error("Entry requires a payload")]
    MissingPayload,

    /// Structurally invalid entry bytes.
    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    /// Decoding failed before any structural check could run.
    #[error("Could not decode entry: {0}")]
    Decode(String),

    /// A public key or signature string could not be parsed.
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

/// Result type for entry operations.
pub type Result<T> = std::result::Result<T, EntryError>;
