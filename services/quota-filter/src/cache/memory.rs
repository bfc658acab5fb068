use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use super::{CacheEntry, CacheError, MetadataCache, DEFAULT_CACHE_CAPACITY};

#[derive(Debug, Clone)]
struct StoredEntry {
    entry: CacheEntry,
    expires_at: Instant,
}

/// In-process metadata cache bounded by entry count.
///
/// The least recently used entry is evicted once `capacity` is reached.
/// Expired entries are dropped when they are next read.
#[derive(Clone)]
pub struct MemoryCache {
    inner: Arc<Mutex<LruCache<String, StoredEntry>>>,
}

impl MemoryCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().cap().get()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[async_trait]
impl MetadataCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let mut guard = self.inner.lock();

        let expired = match guard.get(key) {
            None => return Ok(None),
            Some(stored) if stored.expires_at > Instant::now() => {
                return Ok(Some(stored.entry.clone()))
            }
            Some(_) => true,
        };

        if expired {
            guard.pop(key);
            debug!(key, "cache entry expired");
        }
        Ok(None)
    }

    async fn set(&self, key: &str, entry: CacheEntry, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = Instant::now() + ttl;
        let evicted = self
            .inner
            .lock()
            .push(key.to_string(), StoredEntry { entry, expires_at });

        if let Some((evicted_key, _)) = evicted.filter(|(evicted_key, _)| evicted_key != key) {
            debug!(key = %evicted_key, "cache full, evicted least recently used entry");
        }
        Ok(())
    }
}

/// Cache that never stores anything; every lookup misses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

#[async_trait]
impl MetadataCache for NoCache {
    async fn get(&self, _key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _entry: CacheEntry, _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }
}
