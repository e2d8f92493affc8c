//! # Throttling Module
//!
//! Per-key request throttling, checked before the cache and the network.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Throttle`] | `count` requests per `interval` |
//! | [`ThrottleTable`] | Shared window state keyed by throttle key |
//! | [`throttle_key`] | Key derivation from a composed URL |
//!
//! A throttled request never reaches the network and never touches the cache.
//!
//! ```rust
//! use reqcache::resilience::{throttle_key, Throttle, ThrottleKeyPolicy, ThrottleTable};
//! use std::time::Duration;
//!
//! let table = ThrottleTable::new();
//! let url = url::Url::parse("https://api.example.com/feed?page=1&ts=9").unwrap();
//! let key = throttle_key(&url, &ThrottleKeyPolicy::with_query().ignoring(["ts"]));
//!
//! let throttle = Throttle::new(1, Duration::from_secs(1));
//! assert!(!table.should_throttle(&key, throttle));
//! ```

mod throttle;

pub use throttle::{throttle_key, Throttle, ThrottleKeyPolicy, ThrottleSnapshot, ThrottleTable};
pub(crate) use throttle::saturating_millis;
