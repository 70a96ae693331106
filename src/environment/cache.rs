//! Stamp-validated cache used for parsed environment sources.
//!
//! An entry is only served while the stamp recorded at load time equals the
//! stamp observed now (typically a file modification time). A changed stamp
//! reloads transparently.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};

/// Process-wide cache keyed by `K`, validated by stamp `S`.
#[derive(Debug)]
pub struct StampedCache<K, S, V> {
    entries: Mutex<HashMap<K, (S, V)>>,
}

impl<K, S, V> Default for StampedCache<K, S, V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, S, V> StampedCache<K, S, V>
where
    K: Eq + Hash,
    S: PartialEq,
    V: Clone,
{
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value for `key` if it was stored under an equal `stamp`.
    #[must_use]
    pub fn get(&self, key: &K, stamp: &S) -> Option<V> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .filter(|(cached_stamp, _)| cached_stamp == stamp)
            .map(|(_, value)| value.clone())
    }

    /// Store `value` for `key` under `stamp`, replacing any prior entry.
    pub fn insert(&self, key: K, stamp: S, value: V) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key, (stamp, value));
    }

    /// Drop the entry for `key`.
    pub fn invalidate(&self, key: &K) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
    }

    /// Serve a valid cached value or run `load` and cache its result.
    ///
    /// A failed load is returned as-is and nothing is cached.
    ///
    /// # Errors
    ///
    /// Whatever `load` returns.
    pub fn get_or_load<E>(
        &self,
        key: K,
        stamp: S,
        load: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(value) = self.get(&key, &stamp) {
            return Ok(value);
        }
        let value = load()?;
        self.insert(key, stamp, value.clone());
        Ok(value)
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
