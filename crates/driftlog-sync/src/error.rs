//! Error types for the sync protocol.

use driftlog_log::LogError;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur in the transport layer or the sync session.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The transport is not subscribed to the given topic.
    #[error("Not subscribed to topic \"{0}\"")]
    NotSubscribed(String),

    /// The dialed peer has no handler registered for the protocol.
    #[error("Peer \"{peer}\" has no handler for protocol \"{protocol}\"")]
    NoHandler { peer: String, protocol: String },

    /// A dial did not complete within the configured timeout.
    #[error("Dialing peer \"{peer}\" timed out after {after:?}")]
    DialTimeout { peer: String, after: Duration },

    /// Delivering a message to a peer failed.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// An incoming frame could not be decoded.
    #[error("Could not decode sync frame: {0}")]
    Decode(String),

    /// The sync session is not running.
    #[error("Sync session is not running")]
    NotRunning,

    /// Merging received entries into the local log failed.
    #[error(transparent)]
    Log(#[from] LogError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
