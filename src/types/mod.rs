//! # Types Module
//!
//! Value types shared by every layer of the crate: what a request looks like
//! before it is resolved, what a delivered response looks like, and the task
//! record that ties the two together.
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Method`] | Request method (GET/POST/PUT/PATCH/DELETE) |
//! | [`RequestDescriptor`] | Immutable description of a logical request |
//! | [`Response`] | A delivered response, whatever its origin |
//! | [`Task`] | One dispatch attempt and where its response came from |
//! | [`Provenance`] | Network, system cache, app cache, mock or invalid |
//!
//! ## Example
//!
//! ```rust
//! use reqcache::types::{Method, RequestDescriptor};
//! use std::time::Duration;
//!
//! let request = RequestDescriptor::get("/users?page=2")
//!     .with_header("accept", "application/json")
//!     .with_timeout(Duration::from_secs(5));
//!
//! assert_eq!(request.method(), Method::Get);
//! assert!(request.method().is_cacheable());
//! ```

pub mod request;
pub mod response;
pub mod task;

pub use request::{Method, RequestDescriptor};
pub use response::Response;
pub use task::{Provenance, Task, TaskId};
