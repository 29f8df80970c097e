//! Deterministic traversal over the entry DAG.
//!
//! Entries are explored newest-first from a starting frontier, fetching
//! parents lazily through the storage port. The frontier is a max-heap
//! ordered by `(clock.time, clock.id, hash)`, which makes the produced
//! sequence a topological order consistent with causality and identical
//! on any replica holding the same entry set: along `next` edges a child's
//! Lamport time is strictly greater than its parents', so popping the
//! maximum never yields an ancestor before a descendant, and concurrent
//! entries fall back to the clock-id/hash tie-break.

use crate::error::Result;
use driftlog_entry::{Entry, Hash};
use driftlog_store::KvStore;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

/// Heap wrapper ordering entries by `(clock, hash)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ByClock(pub Entry);

impl Ord for ByClock {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .clock
            .cmp(&other.0.clock)
            .then_with(|| self.0.hash().cmp(&other.0.hash()))
    }
}

impl PartialOrd for ByClock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Lazy newest-first walk over the DAG from a set of starting entries.
///
/// Follows both `next` and `refs` edges, so bounded walks can reach far
/// ancestors without first materializing every intermediate entry.
pub(crate) struct Traversal<'a> {
    store: &'a dyn KvStore,
    frontier: BinaryHeap<ByClock>,
    seen: HashSet<Hash>,
}

impl<'a> Traversal<'a> {
    pub fn new(store: &'a dyn KvStore, from: impl IntoIterator<Item = Entry>) -> Self {
        let mut frontier = BinaryHeap::new();
        let mut seen = HashSet::new();
        for entry in from {
            if seen.insert(entry.hash()) {
                frontier.push(ByClock(entry));
            }
        }
        Traversal {
            store,
            frontier,
            seen,
        }
    }

    /// Produce the next entry, or `None` when the reachable set is
    /// exhausted. Referenced entries missing from storage are skipped
    /// (partial replication).
    pub async fn next(&mut self) -> Result<Option<Entry>> {
        let Some(ByClock(entry)) = self.frontier.pop() else {
            return Ok(None);
        };

        for hash in entry.next.iter().chain(entry.refs.iter()) {
            if self.seen.insert(*hash) {
                if let Some(bytes) = self.store.get(&hash.to_hex()).await? {
                    let parent = Entry::decode(&bytes)?;
                    self.frontier.push(ByClock(parent));
                }
            }
        }

        Ok(Some(entry))
    }

    /// Drain the traversal into a newest-first vector.
    pub async fn collect(mut self) -> Result<Vec<Entry>> {
        let mut out = Vec::new();
        while let Some(entry) = self.next().await? {
            out.push(entry);
        }
        Ok(out)
    }
}
