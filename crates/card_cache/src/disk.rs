//! Persistent [`CacheStore`] keyed by the card URL identity codec.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use card_common::{encode_card_url, CardUrl};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::artifact::ArtifactStore;
use crate::error::CacheError;
use crate::store::CacheStore;

const CARD_EXT: &str = "card";

/// A cache persisted as one artifact per card at
/// `<cache_dir>/<subdir>/<encoded-url>.card`.
///
/// Payloads are JSON behind a checksummed artifact header. Entries read from
/// disk are memoized, so repeated reads within one process return the same
/// `Arc`. Damaged artifacts read as misses.
pub struct DiskCache<V> {
    store: ArtifactStore,
    subdir: String,
    memo: RwLock<HashMap<CardUrl, Arc<V>>>,
    _value: PhantomData<fn() -> V>,
}

impl<V> DiskCache<V> {
    /// Creates a cache storing artifacts under `<cache_dir>/<subdir>`.
    pub fn new(cache_dir: &Path, subdir: &str) -> Self {
        Self {
            store: ArtifactStore::new(cache_dir),
            subdir: subdir.to_string(),
            memo: RwLock::new(HashMap::new()),
            _value: PhantomData,
        }
    }
}

impl<V> DiskCache<V>
where
    V: Serialize + DeserializeOwned + Send + Sync,
{
    fn read(&self, url: &CardUrl) -> Option<V> {
        let payload = self
            .store
            .read_artifact(&self.subdir, &encode_card_url(url), CARD_EXT)?;
        match serde_json::from_slice(&payload) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(%url, error = %e, "discarding undecodable cache entry");
                None
            }
        }
    }

    fn write(&self, url: &CardUrl, value: &V) -> Result<(), CacheError> {
        let payload = serde_json::to_vec(value).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        self.store
            .write_artifact(&self.subdir, &encode_card_url(url), CARD_EXT, &payload)?;
        Ok(())
    }
}

impl<V> CacheStore<V> for DiskCache<V>
where
    V: Serialize + DeserializeOwned + Send + Sync,
{
    fn get(&self, url: &CardUrl) -> Option<Arc<V>> {
        if let Some(hit) = self.memo.read().get(url) {
            return Some(hit.clone());
        }
        let value = Arc::new(self.read(url)?);
        let mut memo = self.memo.write();
        Some(memo.entry(url.clone()).or_insert(value).clone())
    }

    fn set(&self, url: &CardUrl, value: Arc<V>) -> Result<(), CacheError> {
        let mut memo = self.memo.write();
        self.write(url, &value)?;
        memo.insert(url.clone(), value);
        Ok(())
    }

    fn update(&self, url: &CardUrl, value: Arc<V>) -> Result<Option<Arc<V>>, CacheError> {
        let Some(previous) = self.get(url) else {
            return Ok(None);
        };
        self.set(url, value)?;
        Ok(Some(previous))
    }

    fn delete(&self, url: &CardUrl) -> Result<Option<Arc<V>>, CacheError> {
        let previous = self.get(url);
        let mut memo = self.memo.write();
        self.store
            .remove_artifact(&self.subdir, &encode_card_url(url), CARD_EXT)?;
        memo.remove(url);
        Ok(previous)
    }
}
