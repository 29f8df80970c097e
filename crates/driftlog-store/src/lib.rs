//! # driftlog-store
//!
//! Storage ports consumed by the log: an abstract key→bytes store used
//! both for content-addressed entry storage (keyed by entry hash) and for
//! the persisted heads frontier. Concrete backends (disk, LRU, composed,
//! network) live outside this workspace; the in-memory backend here backs
//! tests and demos.
//!
//! Absence of a key is `Ok(None)`, never an error. Stores may be shared
//! between several logs; all methods take `&self`.

mod error;
mod memory;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;

use async_trait::async_trait;

/// Abstract asynchronous key→bytes store.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Store bytes under a key, overwriting any previous value.
    async fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Fetch the bytes stored under a key, `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Remove a key. Best-effort: removing an absent key succeeds.
    async fn del(&self, key: &str) -> Result<()>;

    /// All stored pairs, in no particular order.
    async fn entries(&self) -> Result<Vec<(String, Vec<u8>)>>;

    /// Copy all of another store's pairs into this one.
    ///
    /// Used to simulate shared backing stores before joining logs.
    async fn merge(&self, other: &dyn KvStore) -> Result<()>;

    /// Remove every stored pair.
    async fn clear(&self) -> Result<()>;

    /// Release the store. Operations after close fail.
    async fn close(&self) -> Result<()>;
}
