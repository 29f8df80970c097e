//! The operation-log CRDT.
//!
//! A [`Log`] owns append, heads tracking, join/merge and ordered
//! iteration over a DAG of signed entries. All state lives behind the two
//! storage ports: entries are content-addressed by hash, the current
//! frontier is persisted separately so it survives restarts.

use crate::access::{AccessController, AllowAll};
use crate::error::{LogError, Result};
use crate::traverse::Traversal;
use driftlog_entry::{Entry, Hash, Hasher, Identity, LamportClock};
use driftlog_store::{KvStore, MemoryStore};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Options for creating a [`Log`].
#[derive(Default)]
pub struct LogOptions {
    /// Log id. Generated (ulid) when absent.
    pub id: Option<String>,

    /// Content-addressed entry storage. In-memory when absent.
    pub entry_storage: Option<Arc<dyn KvStore>>,

    /// Heads (frontier) storage. In-memory when absent.
    pub heads_storage: Option<Arc<dyn KvStore>>,

    /// Access controller. Allow-all when absent.
    pub access: Option<Arc<dyn AccessController>>,
}

/// Options for [`Log::append`].
#[derive(Clone, Copy, Debug, Default)]
pub struct AppendOptions {
    /// Maximum number of skip references sampled into the new entry.
    pub references_count: usize,
}

struct LogState {
    /// Current frontier, sorted by clock descending. Always an antichain.
    heads: Vec<Entry>,

    /// Local Lamport time: max over own appends and every joined entry.
    time: u64,
}

/// An eventually-consistent, append-only, signed operation log.
pub struct Log {
    id: String,
    identity: Identity,
    access: Arc<dyn AccessController>,
    entries: Arc<dyn KvStore>,
    heads_store: Arc<dyn KvStore>,
    state: Mutex<LogState>,
}

impl Log {
    /// Open a log for an identity.
    ///
    /// Existing heads are recovered from heads storage, so reopening
    /// over the same stores resumes where the log left off. The identity
    /// must be able to sign.
    pub async fn new(identity: Identity, options: LogOptions) -> Result<Log> {
        if !identity.can_sign() {
            return Err(LogError::Entry(driftlog_entry::EntryError::IdentityRequired));
        }

        let id = options
            .id
            .unwrap_or_else(|| ulid::Ulid::new().to_string());
        let entries = options
            .entry_storage
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let heads_store = options
            .heads_storage
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let access = options.access.unwrap_or_else(|| Arc::new(AllowAll));

        let mut heads = Vec::new();
        for (_, bytes) in heads_store.entries().await? {
            heads.push(Entry::decode(&bytes)?);
        }
        sort_heads(&mut heads);
        let time = heads.iter().map(|e| e.clock.time).max().unwrap_or(0);

        Ok(Log {
            id,
            identity,
            access,
            entries,
            heads_store,
            state: Mutex::new(LogState { heads, time }),
        })
    }

    /// The log id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The identity this log appends with.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The log's current Lamport clock.
    pub async fn clock(&self) -> LamportClock {
        let state = self.state.lock().await;
        LamportClock::at(self.identity.public_key(), state.time)
    }

    /// The current frontier: entries with no locally-known descendant,
    /// sorted by clock descending.
    pub async fn heads(&self) -> Vec<Entry> {
        self.state.lock().await.heads.clone()
    }

    /// Append a payload to the log, returning the new entry.
    ///
    /// The new entry references the current heads via `next` and sampled
    /// deeper ancestors via `refs`; afterwards it is the single head.
    pub async fn append(
        &self,
        payload: impl Into<Vec<u8>>,
        options: AppendOptions,
    ) -> Result<Entry> {
        let mut state = self.state.lock().await;

        let next: Vec<Hash> = state.heads.iter().map(|e| e.hash()).collect();
        let clock = LamportClock::at(self.identity.public_key(), state.time + 1);
        let refs = self
            .collect_refs(&state.heads, &next, options.references_count)
            .await?;

        let entry = Entry::create(&self.identity, &self.id, payload, Some(clock), next, refs)?;

        if !self.access.can_append(&entry).await {
            warn!(log = %self.id, key = %entry.key, "append denied by access controller");
            return Err(LogError::AccessDenied(identity_hash(&entry.key)));
        }

        self.entries
            .put(&entry.hash().to_hex(), &entry.encode())
            .await?;

        state.heads = vec![entry.clone()];
        state.time = entry.clock.time;
        self.persist_heads(&state.heads).await?;

        debug!(log = %self.id, hash = %entry.hash().short(), time = entry.clock.time, "appended entry");
        Ok(entry)
    }

    /// Merge another log of the same id into this one.
    ///
    /// The other log's entries are joined ancestors-first; each entry is
    /// validated independently, so a failing entry aborts the join but
    /// leaves already-joined ancestors in place.
    pub async fn join(&self, other: &Log) -> Result<()> {
        if other.id != self.id {
            return Err(LogError::LogIdMismatch {
                local: self.id.clone(),
                other: other.id.clone(),
            });
        }

        let mut incoming = other.values().await?;
        for entry in incoming.drain(..) {
            self.join_entry(entry).await?;
        }
        Ok(())
    }

    /// Merge a single foreign entry into the log.
    ///
    /// Returns `Ok(false)` when the entry was already present (joining is
    /// idempotent). Rejected entries mutate nothing. Missing ancestors
    /// are tolerated: heads are recomputed over locally-known entries
    /// only, so late-arriving ancestors are absorbed by later joins.
    pub async fn join_entry(&self, entry: Entry) -> Result<bool> {
        let mut state = self.state.lock().await;

        if entry.id != self.id {
            return Err(LogError::LogIdMismatch {
                local: self.id.clone(),
                other: entry.id.clone(),
            });
        }
        entry.validate()?;
        if !entry.verify() {
            warn!(log = %self.id, hash = %entry.hash().short(), "invalid signature");
            return Err(LogError::SignatureInvalid(entry.hash().to_hex()));
        }
        if !self.access.can_append(&entry).await {
            warn!(log = %self.id, key = %entry.key, "join denied by access controller");
            return Err(LogError::AccessDenied(identity_hash(&entry.key)));
        }

        let key = entry.hash().to_hex();
        if self.entries.get(&key).await?.is_some() {
            // Shared or pre-merged storage can hold entries the log has not
            // absorbed yet; only reachability from the current heads makes
            // this join a no-op.
            let target: HashSet<Hash> = [entry.hash()].into();
            if state.heads.iter().any(|h| h.hash() == entry.hash())
                || !self.reachable_targets(&state.heads, &target).await?.is_empty()
            {
                return Ok(false);
            }
        } else {
            self.entries.put(&key, &entry.encode()).await?;
        }

        // Drop current heads that the new entry supersedes.
        let head_hashes: HashSet<Hash> = state.heads.iter().map(|e| e.hash()).collect();
        let superseded = self
            .reachable_targets(std::slice::from_ref(&entry), &head_hashes)
            .await?;
        let mut heads: Vec<Entry> = state
            .heads
            .iter()
            .filter(|h| !superseded.contains(&h.hash()))
            .cloned()
            .collect();

        // The new entry is a head unless a remaining head already covers it
        // (its descendant arrived first).
        let target: HashSet<Hash> = [entry.hash()].into();
        let covered = !self.reachable_targets(&heads, &target).await?.is_empty();
        if !covered {
            heads.push(entry.clone());
        }
        sort_heads(&mut heads);

        state.time = state.time.max(entry.clock.time);
        state.heads = heads;
        self.persist_heads(&state.heads).await?;

        debug!(log = %self.id, hash = %entry.hash().short(), heads = state.heads.len(), "joined entry");
        Ok(true)
    }

    /// Fetch a single entry from storage by hash.
    pub async fn get(&self, hash: &Hash) -> Result<Option<Entry>> {
        match self.entries.get(&hash.to_hex()).await? {
            Some(bytes) => Ok(Some(Entry::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All entries reachable from the current heads, oldest first.
    pub async fn values(&self) -> Result<Vec<Entry>> {
        let heads = { self.state.lock().await.heads.clone() };
        let mut out = Traversal::new(&*self.entries, heads).collect().await?;
        out.reverse();
        Ok(out)
    }

    /// Bounded iteration over the log, newest first.
    ///
    /// `lte`/`lt` choose the starting frontier (inclusive/exclusive of
    /// the named entries), `gte`/`gt` stop the walk (inclusive/exclusive),
    /// `amount` keeps the newest N of the selection.
    pub async fn iter(&self, options: LogIterOptions) -> Result<Vec<Entry>> {
        let start = match (&options.lte, &options.lt) {
            (Some(hashes), _) => self.fetch_entries(hashes).await?,
            (None, Some(hashes)) => {
                let mut parents = Vec::new();
                for excluded in self.fetch_entries(hashes).await? {
                    parents.extend(self.fetch_entries(&excluded.next).await?);
                }
                parents
            }
            (None, None) => self.state.lock().await.heads.clone(),
        };

        let mut walk = Traversal::new(&*self.entries, start);
        let mut out = Vec::new();
        // Newest-first, so the first `amount` entries are the answer and
        // the walk can end without touching the rest of the history.
        while options.amount.map_or(true, |n| out.len() < n) {
            let Some(entry) = walk.next().await? else {
                break;
            };
            if options.gt == Some(entry.hash()) {
                break;
            }
            let stop = options.gte == Some(entry.hash());
            out.push(entry);
            if stop {
                break;
            }
        }
        Ok(out)
    }

    /// Release the log and its storage handles.
    pub async fn close(&self) -> Result<()> {
        self.entries.close().await?;
        self.heads_store.close().await?;
        Ok(())
    }

    /// Sample skip references for a new entry.
    ///
    /// Walks the deterministic newest-first traversal of the pre-append
    /// heads and collects the hash at distances 2, 4, 8, ... (distance 1
    /// is already covered by `next`), until `amount` references are
    /// gathered or history runs out. Gives O(log n) jump pointers into
    /// the chain.
    async fn collect_refs(
        &self,
        heads: &[Entry],
        next: &[Hash],
        amount: usize,
    ) -> Result<Vec<Hash>> {
        if amount == 0 || heads.is_empty() {
            return Ok(Vec::new());
        }

        let mut walk = Traversal::new(&*self.entries, heads.iter().cloned());
        let mut refs = Vec::new();
        let mut distance: u64 = 0;
        let mut target: u64 = 2;
        while let Some(entry) = walk.next().await? {
            distance += 1;
            if distance == target {
                target = target.saturating_mul(2);
                let hash = entry.hash();
                if !next.contains(&hash) {
                    refs.push(hash);
                }
            }
            if refs.len() >= amount {
                break;
            }
        }
        Ok(refs)
    }

    /// Which of `targets` are reachable from `start` (exclusive) through
    /// locally-known entries, following both `next` and `refs` edges.
    async fn reachable_targets(
        &self,
        start: &[Entry],
        targets: &HashSet<Hash>,
    ) -> Result<HashSet<Hash>> {
        let mut found = HashSet::new();
        if targets.is_empty() {
            return Ok(found);
        }

        let mut visited: HashSet<Hash> = start.iter().map(|e| e.hash()).collect();
        let mut queue: VecDeque<Hash> = start
            .iter()
            .flat_map(|e| e.next.iter().chain(e.refs.iter()).copied())
            .collect();

        while let Some(hash) = queue.pop_front() {
            if !visited.insert(hash) {
                continue;
            }
            if targets.contains(&hash) {
                found.insert(hash);
                if found.len() == targets.len() {
                    break;
                }
            }
            if let Some(bytes) = self.entries.get(&hash.to_hex()).await? {
                let entry = Entry::decode(&bytes)?;
                queue.extend(entry.next.iter().chain(entry.refs.iter()).copied());
            }
        }
        Ok(found)
    }

    async fn fetch_entries(&self, hashes: &[Hash]) -> Result<Vec<Entry>> {
        let mut out = Vec::new();
        for hash in hashes {
            let bytes = self
                .entries
                .get(&hash.to_hex())
                .await?
                .ok_or_else(|| LogError::EntryNotFound(hash.to_hex()))?;
            out.push(Entry::decode(&bytes)?);
        }
        Ok(out)
    }

    async fn persist_heads(&self, heads: &[Entry]) -> Result<()> {
        self.heads_store.clear().await?;
        for head in heads {
            self.heads_store
                .put(&head.hash().to_hex(), &head.encode())
                .await?;
        }
        Ok(())
    }
}

/// Bounds for [`Log::iter`].
#[derive(Clone, Debug, Default)]
pub struct LogIterOptions {
    /// Keep only the newest N entries of the selection.
    pub amount: Option<usize>,

    /// Start below these entries, exclusive.
    pub lt: Option<Vec<Hash>>,

    /// Start at these entries, inclusive. Takes precedence over `lt`.
    pub lte: Option<Vec<Hash>>,

    /// Stop when reaching this entry, exclusive.
    pub gt: Option<Hash>,

    /// Stop after producing this entry, inclusive.
    pub gte: Option<Hash>,
}

/// The identity hash for a hex public key, as [`Identity::id`] computes it.
/// Denial messages name the writer by hash, not by raw key.
fn identity_hash(public_key: &str) -> String {
    Hasher::hash(public_key.as_bytes()).to_hex()
}

fn sort_heads(heads: &mut [Entry]) {
    heads.sort_by(|a, b| {
        b.clock
            .cmp(&a.clock)
            .then_with(|| b.hash().cmp(&a.hash()))
    });
}
