use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::entry::CacheEntry;
use super::key::CacheKey;

/// Shared in-memory mapping from [`CacheKey`] to [`CacheEntry`].
///
/// Cloning a `CacheStore` yields another handle to the same map. Each
/// operation takes the lock for a single map call and never across an
/// `.await`. There is no eviction besides explicit [`remove`](Self::remove)
/// and overwrite-on-insert.
#[derive(Debug, Clone, Default)]
pub struct CacheStore {
    inner: Arc<Mutex<HashMap<CacheKey, Arc<CacheEntry>>>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry for `key`, if present. Expiry is not checked here.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        self.lock().get(key).cloned()
    }

    /// Stores `entry` under `key`, returning the entry it replaced.
    pub fn insert(&self, key: CacheKey, entry: CacheEntry) -> Option<Arc<CacheEntry>> {
        self.lock().insert(key, Arc::new(entry))
    }

    pub fn remove(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        self.lock().remove(key)
    }

    /// Removes the entry for `key` only if `predicate` accepts it, checking
    /// and removing under one lock.
    ///
    /// Lets a caller evict the exact entry it judged stale without clobbering
    /// a replacement stored in the meantime.
    pub fn remove_if<F>(&self, key: &CacheKey, predicate: F) -> Option<Arc<CacheEntry>>
    where
        F: FnOnce(&Arc<CacheEntry>) -> bool,
    {
        let mut map = self.lock();
        if predicate(map.get(key)?) {
            map.remove(key)
        } else {
            None
        }
    }

    pub fn contains_key(&self, key: &CacheKey) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // Every critical section is a single map operation, so a panicking holder
    // cannot leave the map half-updated.
    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Arc<CacheEntry>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
