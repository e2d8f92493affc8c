//! Cache store contract and the in-memory backends.

use bytes::Bytes;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime};
use tracing::debug;

/// A stored response: status, body and the time it was stored.
///
/// Entries are never mutated in place; an update replaces the whole entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub body: Bytes,
    pub timestamp: SystemTime,
}

impl CachedResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self::stored_at(status, body, SystemTime::now())
    }

    pub fn stored_at(status: u16, body: impl Into<Bytes>, timestamp: SystemTime) -> Self {
        Self {
            status,
            body: body.into(),
            timestamp,
        }
    }

    /// Age at `now`. Timestamps in the future count as age zero.
    pub fn age_at(&self, now: SystemTime) -> Duration {
        now.duration_since(self.timestamp).unwrap_or(Duration::ZERO)
    }

    pub fn age(&self) -> Duration {
        self.age_at(SystemTime::now())
    }
}

/// Key-value store from request fingerprint to cached response.
///
/// Implementations must be safe for concurrent use and must never surface
/// failures: anything that goes wrong is a miss.
pub trait CacheStore: Send + Sync {
    fn put(&self, fingerprint: &str, response: CachedResponse);
    fn get(&self, fingerprint: &str) -> Option<CachedResponse>;
    fn remove(&self, fingerprint: &str);
    fn remove_all(&self);
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn name(&self) -> &'static str;
}

/// Capacity-bounded in-memory store with least-recently-used eviction.
pub struct MemoryStore {
    entries: Mutex<LruCache<String, CachedResponse>>,
}

impl MemoryStore {
    /// A capacity of zero is treated as one.
    pub fn new(max_entries: usize) -> Self {
        let cap = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(cap)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, CachedResponse>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CacheStore for MemoryStore {
    fn put(&self, fingerprint: &str, response: CachedResponse) {
        let mut entries = self.lock();
        if let Some((evicted, _)) = entries.push(fingerprint.to_string(), response) {
            if evicted != fingerprint {
                debug!(fingerprint = evicted.as_str(), "memory store evicted entry");
            }
        }
    }

    fn get(&self, fingerprint: &str) -> Option<CachedResponse> {
        self.lock().get(fingerprint).cloned()
    }

    fn remove(&self, fingerprint: &str) {
        self.lock().pop(fingerprint);
    }

    fn remove_all(&self) {
        self.lock().clear();
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Store that never keeps anything.
pub struct NullStore;

impl NullStore {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore for NullStore {
    fn put(&self, _: &str, _: CachedResponse) {}
    fn get(&self, _: &str) -> Option<CachedResponse> {
        None
    }
    fn remove(&self, _: &str) {}
    fn remove_all(&self) {}
    fn len(&self) -> usize {
        0
    }
    fn name(&self) -> &'static str {
        "null"
    }
}
