//! Delivered responses.

use super::task::{Provenance, Task};
use crate::decode::{decode_with, JsonDecoder, ResponseDecoder};
use crate::{Error, ErrorContext, Result};
use bytes::Bytes;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use std::time::SystemTime;

/// A response handed to the caller, whether it came from the network, the cache
/// or endpoint mock data.
#[derive(Debug, Clone)]
pub struct Response {
    pub task: Task,
    pub status: u16,
    /// Empty for cached and mocked responses; only status and body are cached.
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Storage time of the cache entry this response was served from.
    pub cached_at: Option<SystemTime>,
}

impl Response {
    pub fn provenance(&self) -> Provenance {
        self.task.provenance()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec()).map_err(|e| {
            Error::decode_with_context(
                format!("response body is not valid UTF-8: {}", e),
                ErrorContext::new()
                    .with_url(self.task.request().url())
                    .with_source("response_text"),
            )
        })
    }

    /// Decode the body as JSON with the default decoder.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        self.decode(&JsonDecoder::default())
    }

    pub fn decode<T: DeserializeOwned>(&self, decoder: &dyn ResponseDecoder) -> Result<T> {
        decode_with(decoder, &self.body).map_err(|e| match e {
            Error::Decode { message, context } => Error::Decode {
                message,
                context: context.with_url(self.task.request().url()),
            },
            other => other,
        })
    }
}
