//! # driftlog-entry
//!
//! Leaf types for the driftlog operation log:
//!
//! - [`Hash`]/[`Hasher`] — SHA-256 content addressing
//! - [`LamportClock`] — per-identity logical clock
//! - [`Identity`] — ed25519 signing/verifying identities
//! - [`Entry`] — immutable, signed, content-addressed log records
//!
//! Entries are canonical: the wire encoding is deterministic, so the same
//! inputs always produce the same hash on any replica.

mod clock;
mod entry;
mod error;
mod hash;
mod identity;

pub use clock::LamportClock;
pub use entry::{Entry, FORMAT_VERSION};
pub use error::{EntryError, Result};
pub use hash::{Hash, Hasher};
pub use identity::{verify, Identity};
