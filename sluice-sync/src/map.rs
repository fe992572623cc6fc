use std::hash::{BuildHasher, Hash};

use hashbrown::{DefaultHashBuilder, HashMap};
use parking_lot::RwLock;

/// Number of shards. Must be a power of two for cheap index masking.
const SHARD_COUNT: usize = 16;

/// A concurrency-safe associative container.
///
/// The map is split into a fixed number of shards, each guarded by its own
/// reader-writer lock. Writes to different shards never contend, which keeps
/// the map usable as shared state between many concurrent tasks without a
/// single global lock.
///
/// Values are returned by clone, so the lock is never held beyond the call.
pub struct SharedMap<K, V> {
    hasher: DefaultHashBuilder,
    shards: Box<[RwLock<HashMap<K, V>>]>,
}

impl<K, V> SharedMap<K, V>
where
    K: Eq + Hash,
{
    /// Creates an empty map.
    pub fn new() -> Self {
        let shards = (0..SHARD_COUNT)
            .map(|_| RwLock::new(HashMap::new()))
            .collect();

        Self {
            hasher: DefaultHashBuilder::default(),
            shards,
        }
    }

    fn shard(&self, key: &K) -> &RwLock<HashMap<K, V>> {
        let hash = self.hasher.hash_one(key) as usize;
        &self.shards[hash & (SHARD_COUNT - 1)]
    }

    /// Inserts a value, returning the previous value for the key if any.
    pub fn store(&self, key: K, value: V) -> Option<V> {
        self.shard(&key).write().insert(key, value)
    }

    /// Returns a clone of the value stored for the key.
    pub fn load(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.shard(key).read().get(key).cloned()
    }

    /// Removes the value stored for the key and returns it.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.shard(key).write().remove(key)
    }

    /// Returns the number of entries across all shards.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    /// Returns `true` if the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.read().is_empty())
    }
}

impl<K, V> Default for SharedMap<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
