use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::seq::{IteratorRandom, SliceRandom};
use std::collections::HashSet;

/// Thread-safe mapping from string keys to values.
///
/// Every mutating primitive is a single atomic check-and-act and returns the number of entries it
/// changed, so callers can report affected counts without holding a lock across calls. Iteration
/// order is unspecified.
#[derive(Debug)]
pub struct ConcurrentDict<V> {
    map: DashMap<String, V>,
}

impl<V: Clone> ConcurrentDict<V> {
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.map.get(key).map(|entry| entry.value().clone())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Inserts or overwrites. Always returns 1.
    pub fn put(&self, key: String, value: V) -> usize {
        self.map.insert(key, value);
        1
    }

    /// Stores `value` only when `key` is absent. Returns 1 when stored, 0 otherwise.
    pub fn put_if_absent(&self, key: String, value: V) -> usize {
        match self.map.entry(key) {
            Entry::Occupied(_) => 0,
            Entry::Vacant(entry) => {
                entry.insert(value);
                1
            }
        }
    }

    /// Overwrites `value` only when `key` is present. Returns 1 when overwritten, 0 otherwise.
    pub fn put_if_exists(&self, key: &str, value: V) -> usize {
        match self.map.get_mut(key) {
            Some(mut entry) => {
                *entry = value;
                1
            }
            None => 0,
        }
    }

    /// Returns 1 when `key` was present, 0 otherwise.
    pub fn remove(&self, key: &str) -> usize {
        match self.map.remove(key) {
            Some(_) => 1,
            None => 0,
        }
    }

    /// Visits every entry until `visitor` returns `false`.
    ///
    /// The visitor runs while a shard is read-locked: it must not call back into this dictionary.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&str, &V) -> bool,
    {
        for entry in self.map.iter() {
            if !visitor(entry.key(), entry.value()) {
                break;
            }
        }
    }

    pub fn keys(&self) -> HashSet<String> {
        self.map.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Returns `limit` keys picked at random, possibly repeated. Empty when the dictionary is.
    pub fn random_keys(&self, limit: usize) -> Vec<String> {
        let keys: Vec<String> = self.map.iter().map(|entry| entry.key().clone()).collect();
        let mut rng = rand::thread_rng();

        (0..limit)
            .filter_map(|_| keys.choose(&mut rng).cloned())
            .collect()
    }

    /// Returns at most `limit` distinct keys picked at random.
    pub fn random_distinct_keys(&self, limit: usize) -> Vec<String> {
        let mut rng = rand::thread_rng();

        self.map
            .iter()
            .map(|entry| entry.key().clone())
            .choose_multiple(&mut rng, limit)
    }

    /// Removes every entry, one shard at a time. This is not a single atomic step: a key inserted
    /// concurrently into an already cleared shard survives.
    pub fn clear(&self) {
        self.map.clear();
    }
}

impl<V: Clone> Default for ConcurrentDict<V> {
    fn default() -> Self {
        Self::new()
    }
}
