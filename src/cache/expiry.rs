//! Expiry policies for cached responses.

use super::backend::CachedResponse;
use std::time::{Duration, SystemTime};

/// How long a cached response stays usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheExpiry {
    /// Always valid.
    #[default]
    Never,
    /// Always expired; the entry is removed as soon as it is looked up.
    Always,
    /// Invisible to normal lookups; only served when a live request fails.
    Contingent,
    /// Valid for the duration, then served only as a fallback for failed requests.
    /// Expired entries are kept.
    ContingentAfter(Duration),
    /// Strict TTL. Past the TTL the entry reads as absent, and it is removed once
    /// a live request for it succeeds.
    Custom(Duration),
    /// `Custom` with a negative TTL: expired even at age zero. Unlike `Always`
    /// the entry survives lookups and fresh responses are still written.
    Expired,
}

impl CacheExpiry {
    /// `Custom` from signed seconds. A negative TTL becomes [`CacheExpiry::Expired`].
    pub fn custom_secs(secs: i64) -> Self {
        match u64::try_from(secs) {
            Ok(s) => CacheExpiry::Custom(Duration::from_secs(s)),
            Err(_) => CacheExpiry::Expired,
        }
    }

    /// `ContingentAfter` from signed seconds. A negative window leaves only the
    /// fallback behaviour.
    pub fn contingent_after_secs(secs: i64) -> Self {
        match u64::try_from(secs) {
            Ok(s) => CacheExpiry::ContingentAfter(Duration::from_secs(s)),
            Err(_) => CacheExpiry::Contingent,
        }
    }

    /// Decide whether `entry` may be used now.
    ///
    /// `request_failed` is true when a live network attempt has just failed and
    /// the caller is looking for something to fall back on.
    pub fn resolve(&self, entry: CachedResponse, request_failed: bool) -> Option<CachedResponse> {
        self.resolve_at(entry, request_failed, SystemTime::now())
    }

    pub fn resolve_at(
        &self,
        entry: CachedResponse,
        request_failed: bool,
        now: SystemTime,
    ) -> Option<CachedResponse> {
        let fresh = |ttl: Duration| entry.age_at(now) <= ttl;
        let usable = match *self {
            CacheExpiry::Never => true,
            CacheExpiry::Always | CacheExpiry::Expired => false,
            CacheExpiry::Contingent => request_failed,
            CacheExpiry::ContingentAfter(ttl) => request_failed || fresh(ttl),
            CacheExpiry::Custom(ttl) => fresh(ttl),
        };
        usable.then_some(entry)
    }

    /// Entries under this policy are deleted at lookup time.
    pub fn removes_on_lookup(&self) -> bool {
        matches!(self, CacheExpiry::Always)
    }

    /// Whether a successful live request should delete the previously stored
    /// entry, given that entry's age.
    pub fn removes_after_success(&self, age: Duration) -> bool {
        match *self {
            CacheExpiry::Custom(ttl) => age > ttl,
            CacheExpiry::Expired => true,
            _ => false,
        }
    }

    /// Whether fresh responses under this policy are written at all.
    pub fn stores_responses(&self) -> bool {
        !matches!(self, CacheExpiry::Always)
    }
}
