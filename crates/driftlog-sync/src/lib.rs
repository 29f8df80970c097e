//! Replica synchronization for driftlog.
//!
//! Ties a [`driftlog_log::Log`] to a [`Transport`]: peers on the same
//! topic exchange heads when they meet, fetch whatever history behind
//! those heads they are missing, and broadcast new entries as they are
//! appended, converging every replica to the same log.
//!
//! ```no_run
//! use driftlog_entry::Identity;
//! use driftlog_log::{Log, LogOptions};
//! use driftlog_sync::{MemoryNetwork, SyncOptions, SyncSession};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let net = MemoryNetwork::new();
//! let log = Arc::new(
//!     Log::new(
//!         Identity::generate(),
//!         LogOptions { id: Some("events".into()), ..Default::default() },
//!     )
//!     .await?,
//! );
//!
//! let session = SyncSession::new(
//!     log.clone(),
//!     Arc::new(net.transport("replica-1")),
//!     SyncOptions::default(),
//! );
//! session.start().await?;
//!
//! let entry = log.append("hello", Default::default()).await?;
//! session.add(&entry).await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod session;
mod transport;

pub use error::{Result, SyncError};
pub use session::{SyncEvent, SyncOptions, SyncSession};
pub use transport::{MemoryNetwork, MemoryTransport, PeerId, StreamHandler, Transport, TransportEvent};
