//! In-memory response cache with TTL expiry.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{CacheKey, CachedResponse, ResponseCache};
use crate::config::CacheConfig;
use crate::observability::metrics;

#[derive(Debug, Clone)]
struct Entry {
    response: CachedResponse,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// A thread-safe, bounded response cache.
#[derive(Debug, Clone)]
pub struct MemoryCache {
    inner: Arc<DashMap<CacheKey, Entry>>,
    ttl: Duration,
    max_entries: usize,
}

impl MemoryCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(Duration::from_secs(config.ttl_secs), config.max_entries)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Drop expired entries first, then arbitrary ones, until there is room.
    fn make_room(&self) {
        if self.inner.len() < self.max_entries {
            return;
        }
        let now = Instant::now();
        self.inner.retain(|_, entry| entry.is_live(now));

        while self.inner.len() >= self.max_entries {
            let Some(victim) = self.inner.iter().next().map(|r| r.key().clone()) else {
                break;
            };
            self.inner.remove(&victim);
            metrics::record_cache_event("evict");
        }
    }
}

impl ResponseCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<CachedResponse> {
        let now = Instant::now();
        let hit = self
            .inner
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.response.clone());

        if hit.is_none() {
            self.inner.remove_if(key, |_, entry| !entry.is_live(now));
        }
        hit
    }

    fn put(&self, key: CacheKey, response: CachedResponse) {
        self.make_room();
        self.inner.insert(
            key,
            Entry {
                response,
                expires_at: Instant::now() + self.ttl,
            },
        );
        metrics::record_cache_event("store");
    }
}
