//! In-memory store backend.

use crate::error::{Result, StoreError};
use crate::KvStore;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// In-memory [`KvStore`] for tests, demos and caches.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<State>,
}

#[derive(Default)]
struct State {
    map: HashMap<String, Vec<u8>>,
    closed: bool,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn check_open(state: &State) -> Result<()> {
        if state.closed {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut state = self.inner.write();
        Self::check_open(&state)?;
        state.map.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let state = self.inner.read();
        Self::check_open(&state)?;
        Ok(state.map.get(key).cloned())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut state = self.inner.write();
        Self::check_open(&state)?;
        state.map.remove(key);
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<(String, Vec<u8>)>> {
        let state = self.inner.read();
        Self::check_open(&state)?;
        Ok(state.map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    async fn merge(&self, other: &dyn KvStore) -> Result<()> {
        let pairs = other.entries().await?;
        let mut state = self.inner.write();
        Self::check_open(&state)?;
        for (k, v) in pairs {
            state.map.insert(k, v);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.inner.write();
        Self::check_open(&state)?;
        state.map.clear();
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.inner.write();
        state.map.clear();
        state.closed = true;
        Ok(())
    }
}
