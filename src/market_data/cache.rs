// =============================================================================
// TTL Cache — sharded, thread-safe store for previously fetched upstream data
// =============================================================================
//
// Keys are hashed onto a fixed number of shards, each guarded by its own
// `parking_lot::RwLock`, so concurrent writers to distinct keys rarely touch
// the same lock.  Entries expire `ttl` after insertion; expired entries are
// treated as absent on read and swept lazily on write.
// =============================================================================

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::debug;

const DEFAULT_SHARDS: usize = 16;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// Sharded key/value cache whose entries expire after a fixed time window.
pub struct TtlCache<K, V> {
    shards: Vec<RwLock<HashMap<K, Entry<V>>>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self::with_shards(ttl, DEFAULT_SHARDS)
    }

    pub fn with_shards(ttl: Duration, shards: usize) -> Self {
        let shards = (0..shards.max(1)).map(|_| RwLock::new(HashMap::new())).collect();
        Self { shards, ttl }
    }

    fn shard(&self, key: &K) -> &RwLock<HashMap<K, Entry<V>>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.shards.len();
        &self.shards[idx]
    }

    /// Return a clone of the cached value if it has not expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let shard = self.shard(key).read();
        let entry = shard.get(key)?;
        if entry.inserted_at.elapsed() < self.ttl {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    /// Insert or replace a value, sweeping expired entries in the same shard.
    pub fn insert(&self, key: K, value: V) {
        let ttl = self.ttl;
        let mut shard = self.shard(&key).write();
        shard.retain(|_, e| e.inserted_at.elapsed() < ttl);
        shard.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    #[cfg(test)]
    pub fn remove(&self, key: &K) -> Option<V> {
        self.shard(key).write().remove(key).map(|e| e.value)
    }

    /// Drop every entry.
    pub fn clear(&self) {
        for shard in &self.shards {
            shard.write().clear();
        }
        debug!("cache cleared");
    }

    /// Number of live (non-expired) entries.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| {
                s.read()
                    .values()
                    .filter(|e| e.inserted_at.elapsed() < self.ttl)
                    .count()
            })
            .sum()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
