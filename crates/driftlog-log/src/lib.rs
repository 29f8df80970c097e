//! # driftlog-log
//!
//! The conflict-free replicated operation log: append with skip
//! references, heads (frontier) tracking, deterministic causal ordering,
//! and the join/merge algorithm that makes replicas converge.
//!
//! Joining is associative, commutative and idempotent: any two replicas
//! holding the same entry set produce the same linearization regardless
//! of join order or history.
//!
//! ## Example
//!
//! ```rust,no_run
//! use driftlog_entry::Identity;
//! use driftlog_log::{AppendOptions, Log, LogOptions};
//!
//! # async fn example() -> driftlog_log::Result<()> {
//! let log = Log::new(
//!     Identity::generate(),
//!     LogOptions {
//!         id: Some("chat".into()),
//!         ..Default::default()
//!     },
//! )
//! .await?;
//!
//! log.append("hello", AppendOptions::default()).await?;
//! assert_eq!(log.values().await?.len(), 1);
//! # Ok(())
//! # }
//! ```

mod access;
mod error;
mod log;
mod traverse;

pub use access::{AccessController, AllowAll, AllowedKeys};
pub use error::{LogError, Result};
pub use log::{AppendOptions, Log, LogIterOptions, LogOptions};
