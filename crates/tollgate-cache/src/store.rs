use crate::entry::CacheEntry;
use bytes::Bytes;
use http::HeaderMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Number of shards. Must be a power of two for fast modulo via bitmask.
const NUM_SHARDS: usize = 16;
const SHARD_MASK: u64 = (NUM_SHARDS as u64) - 1;

type Shard = RwLock<HashMap<String, Arc<CacheEntry>>>;

/// Thread-safe path → entry map.
///
/// Keys are spread over 16 shards, each behind its own `RwLock`, with the
/// shard picked by `ahash`. Values are `Arc<CacheEntry>`:
///
/// - **get**: read lock on one shard, clone the `Arc`, release. The caller
///   keeps a complete entry even if it is replaced a moment later.
/// - **put**: build the entry outside the lock, then write lock on one shard
///   and swap the `Arc`. Readers see the old entry or the new one, never a mix.
///
/// Nothing is ever evicted. Stale entries stay until the next `put` for the
/// same path supersedes them.
#[derive(Default)]
pub struct CacheStore {
    shards: [Shard; NUM_SHARDS],
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn shard_index(path: &str) -> usize {
        let hash = ahash::RandomState::with_seeds(1, 2, 3, 4).hash_one(path);
        (hash & SHARD_MASK) as usize
    }

    #[inline]
    fn shard(&self, path: &str) -> &Shard {
        &self.shards[Self::shard_index(path)]
    }

    /// Current entry for `path`, fresh or not. No side effects.
    pub fn get(&self, path: &str) -> Option<Arc<CacheEntry>> {
        self.shard(path).read().get(path).cloned()
    }

    /// Store a new entry for `path`, replacing any previous one.
    pub fn put(&self, path: &str, body: Bytes, headers: HeaderMap, now: Instant) -> Arc<CacheEntry> {
        let entry = Arc::new(CacheEntry::new(path, body, headers, now));
        self.shard(path)
            .write()
            .insert(path.to_string(), Arc::clone(&entry));
        entry
    }

    /// Number of paths with an entry (fresh or stale).
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.read().is_empty())
    }

    /// Point-in-time copy of every entry, sorted by path.
    pub fn snapshot(&self) -> Vec<Arc<CacheEntry>> {
        let mut entries: Vec<Arc<CacheEntry>> = self
            .shards
            .iter()
            .flat_map(|s| s.read().values().cloned().collect::<Vec<_>>())
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }
}
