//! Network transport seam.
//!
//! The session never talks to an HTTP client directly; it hands a fully composed
//! [`TransportRequest`] to a [`Transport`]. [`HttpTransport`] is the reqwest-backed
//! implementation; tests substitute scripted transports.

mod http;

pub use http::HttpTransport;

use crate::types::Method;
use crate::{BoxStream, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use std::time::Duration;
use url::Url;

/// A request ready for the wire: URL composed, headers final, body encoded.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    pub timeout: Duration,
}

impl TransportRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// The transport answered from its own HTTP cache.
    pub from_cache: bool,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
            from_cache: false,
        }
    }
}

/// Streaming response used for downloads.
pub struct DownloadStream {
    pub status: u16,
    pub content_length: Option<u64>,
    pub headers: HeaderMap,
    pub body: BoxStream<'static, Bytes>,
}

impl std::fmt::Debug for DownloadStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadStream")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform the request and buffer the whole response.
    ///
    /// Any HTTP status is a successful return; only failures to obtain a
    /// response at all (connect, timeout, body read) are errors.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse>;

    /// Perform the request and stream the response body.
    async fn download(&self, request: TransportRequest) -> Result<DownloadStream>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Other(String),
}
