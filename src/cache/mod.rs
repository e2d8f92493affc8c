//! # Response Caching Module
//!
//! Pluggable response storage plus the expiry rules that decide when a stored
//! response may be served.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CacheStore`] | Trait for implementing custom stores |
//! | [`MemoryStore`] | Bounded in-memory LRU store |
//! | [`DiskStore`] | Durable store, one file per fingerprint |
//! | [`NullStore`] | No-op store for disabling caching |
//! | [`CacheExpiry`] | Expiry policy evaluated before and after dispatch |
//! | [`ResponseCache`] | Store + default policy + statistics, used by the session |
//! | [`fingerprint`] | Cache key derivation from a composed URL |
//!
//! ## Expiry policies
//!
//! | Policy | Normal lookup | After a failed request | After a successful request |
//! |--------|---------------|------------------------|----------------------------|
//! | `Never` | always served | served | overwritten |
//! | `Always` | removed, miss | miss | not written |
//! | `Contingent` | miss | served | overwritten |
//! | `ContingentAfter(d)` | served while age ≤ d | served | overwritten |
//! | `Custom(d)` | served while age ≤ d | miss | stale entry removed, then overwritten |
//! | `Expired` | miss | miss | stale entry removed, then overwritten |
//!
//! ## Example
//!
//! ```rust
//! use reqcache::cache::{CacheExpiry, CacheStore, CachedResponse, MemoryStore};
//! use std::time::Duration;
//!
//! let store = MemoryStore::new(128);
//! store.put("api.example.com/users", CachedResponse::new(200, "[]"));
//!
//! let entry = store.get("api.example.com/users").unwrap();
//! let policy = CacheExpiry::Custom(Duration::from_secs(60));
//! assert!(policy.resolve(entry, false).is_some());
//! ```

mod backend;
mod disk;
mod expiry;
mod key;
mod manager;

pub use backend::{CacheStore, CachedResponse, MemoryStore, NullStore};
pub use disk::DiskStore;
pub use expiry::CacheExpiry;
pub use key::fingerprint;
pub use manager::{CacheConfig, CacheStats, Lookup, ResponseCache};
