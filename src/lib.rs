//! # reqcache
//!
//! An HTTP client convenience layer that decides, per request, whether the
//! answer comes from endpoint mock data, the response cache or the network,
//! and that throttles endpoints before either cache or network is touched.
//!
//! ## Overview
//!
//! A [`Session`] owns one response cache, one throttle table, one transport and
//! the set of in-flight requests. [`Endpoint`]s are lightweight request handles
//! bound to a session; each dispatch goes through the same priority order:
//!
//! 1. simulated offline mode
//! 2. URL composition (bad URLs never reach the network)
//! 3. disabled request methods
//! 4. one-shot mock data set on the endpoint
//! 5. per-endpoint throttle
//! 6. the response cache, evaluated against a [`CacheExpiry`] policy
//! 7. the network, with contingent cache fallback when the attempt fails
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use reqcache::{CacheExpiry, RequestDescriptor, Session};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> reqcache::Result<()> {
//!     let session = Session::builder()
//!         .base_url("https://httpbin.org")
//!         .default_expiry(CacheExpiry::Custom(Duration::from_secs(3600)))
//!         .build()?;
//!
//!     let endpoint = session.endpoint();
//!     let first = endpoint.dispatch(RequestDescriptor::get("/get")).await?;
//!     let second = endpoint.dispatch(RequestDescriptor::get("/get")).await?;
//!     assert!(second.provenance().is_cached());
//!     println!("{} bytes, then {} bytes from cache", first.body.len(), second.body.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Sessions, endpoints, the resolver and in-flight bookkeeping |
//! | [`cache`] | Cache stores, expiry policies and fingerprinting |
//! | [`resilience`] | Per-key request throttling |
//! | [`transport`] | Transport seam and the reqwest implementation |
//! | [`decode`] | Response decoding strategies |
//! | [`types`] | Request descriptors, responses and tasks |

pub mod cache;
pub mod client;
pub mod decode;
pub mod resilience;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use cache::{CacheExpiry, CacheStore, DiskStore, MemoryStore, NullStore};
pub use client::{CachePolicy, DispatchOptions, Endpoint, Session, SessionBuilder};
pub use decode::{JsonDecoder, KeyStrategy, ResponseDecoder};
pub use resilience::{Throttle, ThrottleKeyPolicy};
pub use types::{Method, Provenance, RequestDescriptor, Response, Task, TaskId};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits `Result<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
