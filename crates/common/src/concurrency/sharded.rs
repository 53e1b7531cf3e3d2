use std::collections::HashMap;

use parking_lot::RwLock;

use crate::guid::Guid;

pub const DEFAULT_SHARDS: usize = 16;

/// A GUID-keyed map split across independently locked shards.
///
/// Closures passed to the `*_with` methods run under the shard lock and must
/// not block.
#[derive(Debug)]
pub struct ShardedMap<V> {
    shards: Vec<RwLock<HashMap<Guid, V>>>,
}

impl<V> Default for ShardedMap<V> {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS)
    }
}

impl<V> ShardedMap<V> {
    pub fn new(shards: usize) -> Self {
        let shards = shards.max(1);
        Self {
            shards: (0..shards).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, key: &Guid) -> &RwLock<HashMap<Guid, V>> {
        &self.shards[key.shard(self.shards.len())]
    }

    pub fn insert(&self, key: Guid, value: V) -> Option<V> {
        self.shard(&key).write().insert(key, value)
    }

    pub fn remove(&self, key: &Guid) -> Option<V> {
        self.shard(key).write().remove(key)
    }

    pub fn contains(&self, key: &Guid) -> bool {
        self.shard(key).read().contains_key(key)
    }

    pub fn read_with<R>(&self, key: &Guid, f: impl FnOnce(Option<&V>) -> R) -> R {
        f(self.shard(key).read().get(key))
    }

    pub fn update_with<R>(&self, key: Guid, f: impl FnOnce(&mut V) -> R) -> R
    where
        V: Default,
    {
        let mut shard = self.shard(&key).write();
        f(shard.entry(key).or_default())
    }

    /// Replace the entry under `key` with `f(previous)` in one shard write
    pub fn upsert_with(&self, key: Guid, f: impl FnOnce(Option<V>) -> V) {
        let mut shard = self.shard(&key).write();
        let value = f(shard.remove(&key));
        shard.insert(key, value);
    }

    pub fn clear(&self) {
        for shard in &self.shards {
            shard.write().clear();
        }
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> ShardedMap<V> {
    pub fn get(&self, key: &Guid) -> Option<V> {
        self.shard(key).read().get(key).cloned()
    }

    /// Copy out every entry, one shard at a time
    pub fn snapshot(&self) -> Vec<(Guid, V)> {
        self.shards
            .iter()
            .flat_map(|s| {
                s.read()
                    .iter()
                    .map(|(k, v)| (*k, v.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_ops() {
        let map = ShardedMap::default();
        let a = Guid::hash(b"a");
        let b = Guid::hash(b"b");

        assert!(map.insert(a, 1).is_none());
        assert_eq!(map.insert(a, 2), Some(1));
        map.insert(b, 3);
        assert_eq!(map.get(&a), Some(2));
        assert_eq!(map.len(), 2);

        map.update_with(b, |v| *v += 1);
        assert_eq!(map.get(&b), Some(4));

        assert_eq!(map.remove(&a), Some(2));
        assert!(!map.contains(&a));
        map.clear();
        assert!(map.is_empty());
    }

    #[test]
    fn test_update_inserts_default() {
        let map: ShardedMap<Vec<u8>> = ShardedMap::new(4);
        let key = Guid::hash(b"k");
        map.update_with(key, |v| v.push(7));
        assert_eq!(map.get(&key), Some(vec![7]));
        assert_eq!(map.snapshot(), vec![(key, vec![7])]);
    }
}
