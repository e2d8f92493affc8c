use crate::cache::CacheStats;
use crate::client::inflight::SessionCountersSnapshot;

/// A lightweight snapshot of session state.
///
/// This is intentionally *facts only* (no policy).
#[derive(Debug, Clone, Default)]
pub struct SessionSignals {
    /// Network tasks currently running.
    pub inflight: usize,
    /// Throttle keys with an open window.
    pub throttle_keys: usize,
    pub cache_entries: usize,
    pub cache: CacheStats,
    pub offline: bool,
    pub counters: SessionCountersSnapshot,
}
