//! Cache manager: a store plus expiry bookkeeping and statistics.

use super::backend::{CacheStore, CachedResponse};
use super::expiry::CacheExpiry;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub default_expiry: CacheExpiry,
    pub enabled: bool,
    /// Bodies larger than this are never written.
    pub max_entry_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_expiry: CacheExpiry::Never,
            enabled: true,
            max_entry_size: 10 * 1024 * 1024,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_default_expiry(mut self, expiry: CacheExpiry) -> Self {
        self.default_expiry = expiry;
        self
    }
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
    pub fn with_max_entry_size(mut self, bytes: usize) -> Self {
        self.max_entry_size = bytes;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub removals: u64,
    pub fallbacks: u64,
    pub skipped_writes: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    removals: AtomicU64,
    fallbacks: AtomicU64,
    skipped_writes: AtomicU64,
}

impl AtomicStats {
    fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            removals: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
            skipped_writes: AtomicU64::new(0),
        }
    }

    fn to_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            removals: self.removals.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            skipped_writes: self.skipped_writes.load(Ordering::Relaxed),
        }
    }
}

/// Outcome of a pre-dispatch cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// A usable entry.
    Hit(CachedResponse),
    /// Nothing usable. `stale` holds an entry that exists but is not usable under
    /// the current policy; it is kept for post-completion reconciliation.
    Miss { stale: Option<CachedResponse> },
}

pub struct ResponseCache {
    config: CacheConfig,
    store: Arc<dyn CacheStore>,
    stats: Arc<AtomicStats>,
}

impl ResponseCache {
    pub fn new(config: CacheConfig, store: Arc<dyn CacheStore>) -> Self {
        Self {
            config,
            store,
            stats: Arc::new(AtomicStats::new()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn default_expiry(&self) -> CacheExpiry {
        self.config.default_expiry
    }

    /// Pre-dispatch lookup. `Always` entries are deleted here.
    pub fn lookup(&self, fingerprint: &str, expiry: CacheExpiry) -> Lookup {
        if !self.config.enabled {
            return Lookup::Miss { stale: None };
        }
        let Some(entry) = self.store.get(fingerprint) else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return Lookup::Miss { stale: None };
        };

        if expiry.removes_on_lookup() {
            self.remove(fingerprint);
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return Lookup::Miss { stale: None };
        }

        match expiry.resolve(entry.clone(), false) {
            Some(valid) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                info!(
                    fingerprint,
                    store = self.store.name(),
                    status = valid.status,
                    "cache hit"
                );
                Lookup::Hit(valid)
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                Lookup::Miss { stale: Some(entry) }
            }
        }
    }

    /// Entry to serve in place of a failed network attempt, if the policy allows.
    pub fn fallback(&self, fingerprint: &str, expiry: CacheExpiry) -> Option<CachedResponse> {
        if !self.config.enabled {
            return None;
        }
        let entry = self.store.get(fingerprint)?;
        let usable = expiry.resolve(entry, true)?;
        self.stats.fallbacks.fetch_add(1, Ordering::Relaxed);
        info!(
            fingerprint,
            store = self.store.name(),
            status = usable.status,
            "serving cached entry after failed request"
        );
        Some(usable)
    }

    /// Apply removal side effects after a live request succeeded, for an entry
    /// that was found unusable before dispatch. Only the exact entry seen then
    /// (same timestamp) is removed.
    pub fn reconcile_after_success(
        &self,
        fingerprint: &str,
        expiry: CacheExpiry,
        stale: &CachedResponse,
    ) -> bool {
        if !expiry.removes_after_success(stale.age()) {
            return false;
        }
        match self.store.get(fingerprint) {
            Some(current) if current.timestamp == stale.timestamp => {
                self.remove(fingerprint);
                true
            }
            _ => false,
        }
    }

    /// Store a fresh response. Returns whether anything was written.
    pub fn write(&self, fingerprint: &str, status: u16, body: Bytes, expiry: CacheExpiry) -> bool {
        if !self.config.enabled || !expiry.stores_responses() {
            return false;
        }
        if body.len() > self.config.max_entry_size {
            self.stats.skipped_writes.fetch_add(1, Ordering::Relaxed);
            info!(
                fingerprint,
                bytes = body.len(),
                limit = self.config.max_entry_size,
                "response too large to cache"
            );
            return false;
        }
        let bytes = body.len();
        self.store.put(fingerprint, CachedResponse::new(status, body));
        self.stats.writes.fetch_add(1, Ordering::Relaxed);
        info!(fingerprint, store = self.store.name(), status, bytes, "cache write");
        true
    }

    pub fn remove(&self, fingerprint: &str) {
        self.store.remove(fingerprint);
        self.stats.removals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.store.remove_all();
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats()
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.name()
    }
}
