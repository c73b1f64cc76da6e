//! The cache capability shared by the raw-card and compiled-card caches.

use std::collections::HashMap;
use std::sync::Arc;

use card_common::CardUrl;
use parking_lot::RwLock;

use crate::error::CacheError;

/// A URL-keyed cache of shared values.
///
/// Values are handed out as `Arc`s so every reader of one entry observes the
/// same instance. Each mutation applies atomically: a concurrent reader sees
/// the entry either before or after it, never a partial write.
pub trait CacheStore<V>: Send + Sync {
    /// Returns the cached value for `url`, if any.
    fn get(&self, url: &CardUrl) -> Option<Arc<V>>;

    /// Stores `value` for `url`, replacing any existing entry.
    fn set(&self, url: &CardUrl, value: Arc<V>) -> Result<(), CacheError>;

    /// Replaces an existing entry and returns the previous value.
    ///
    /// Does nothing and returns `None` when `url` is not cached.
    fn update(&self, url: &CardUrl, value: Arc<V>) -> Result<Option<Arc<V>>, CacheError>;

    /// Removes the entry for `url` and returns it.
    fn delete(&self, url: &CardUrl) -> Result<Option<Arc<V>>, CacheError>;
}

/// An in-process [`CacheStore`].
#[derive(Debug)]
pub struct MemoryCache<V> {
    entries: RwLock<HashMap<CardUrl, Arc<V>>>,
}

impl<V> MemoryCache<V> {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<V> Default for MemoryCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Send + Sync> CacheStore<V> for MemoryCache<V> {
    fn get(&self, url: &CardUrl) -> Option<Arc<V>> {
        self.entries.read().get(url).cloned()
    }

    fn set(&self, url: &CardUrl, value: Arc<V>) -> Result<(), CacheError> {
        self.entries.write().insert(url.clone(), value);
        Ok(())
    }

    fn update(&self, url: &CardUrl, value: Arc<V>) -> Result<Option<Arc<V>>, CacheError> {
        let mut entries = self.entries.write();
        match entries.get_mut(url) {
            Some(slot) => Ok(Some(std::mem::replace(slot, value))),
            None => Ok(None),
        }
    }

    fn delete(&self, url: &CardUrl) -> Result<Option<Arc<V>>, CacheError> {
        Ok(self.entries.write().remove(url))
    }
}
