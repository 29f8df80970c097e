//! Access-controller capability.
//!
//! The log consults a single predicate before admitting an entry, locally
//! appended or joined. Policy implementations (identity stores, capability
//! systems) live outside this workspace.

use async_trait::async_trait;
use driftlog_entry::Entry;
use std::collections::HashSet;

/// Decides whether an entry may be appended to the log.
#[async_trait]
pub trait AccessController: Send + Sync {
    /// `true` when the entry's writer is allowed.
    async fn can_append(&self, entry: &Entry) -> bool;
}

/// Admits every writer. The default controller.
#[derive(Clone, Debug, Default)]
pub struct AllowAll;

#[async_trait]
impl AccessController for AllowAll {
    async fn can_append(&self, _entry: &Entry) -> bool {
        true
    }
}

/// Admits only an explicit set of writer public keys.
#[derive(Clone, Debug, Default)]
pub struct AllowedKeys {
    keys: HashSet<String>,
}

impl AllowedKeys {
    /// Build a controller admitting the given hex public keys.
    pub fn new(keys: impl IntoIterator<Item = String>) -> Self {
        AllowedKeys {
            keys: keys.into_iter().collect(),
        }
    }

    /// Grant write access to a key.
    pub fn grant(&mut self, key: impl Into<String>) {
        self.keys.insert(key.into());
    }
}

#[async_trait]
impl AccessController for AllowedKeys {
    async fn can_append(&self, entry: &Entry) -> bool {
        self.keys.contains(&entry.key)
    }
}
