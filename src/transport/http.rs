use super::{DownloadStream, Transport, TransportError, TransportRequest, TransportResponse};
use crate::Result;
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::Proxy;
use std::env;
use std::time::Duration;
use tracing::debug;

/// reqwest-backed transport.
///
/// Connection pooling, TLS and HTTP/2 are reqwest's business; the knobs below
/// are read from the environment once, at construction.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        // Whole-request timeouts are set per request; this only bounds connecting.
        let connect_timeout_secs = env::var("REQCACHE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(30);

        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .pool_max_idle_per_host(
                env::var("REQCACHE_HTTP_POOL_MAX_IDLE_PER_HOST")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(32),
            )
            .pool_idle_timeout(Some(Duration::from_secs(
                env::var("REQCACHE_HTTP_POOL_IDLE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(90),
            )));

        if let Ok(proxy_url) = env::var("REQCACHE_PROXY_URL") {
            if let Ok(proxy) = Proxy::all(&proxy_url) {
                builder = builder.proxy(proxy);
            }
        }

        let client = builder
            .build()
            .map_err(|e| crate::Error::Transport(TransportError::Other(e.to_string())))?;

        Ok(Self { client })
    }

    /// Wrap an already configured client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build(&self, request: &TransportRequest) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .request(request.method.into(), request.url.clone())
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            req = req.body(body.clone());
        }
        req
    }

    fn map_error(e: reqwest::Error, timeout: Duration) -> crate::Error {
        if e.is_timeout() {
            crate::Error::Transport(TransportError::Timeout(timeout))
        } else {
            crate::Error::Transport(TransportError::Http(e))
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        debug!(method = %request.method, url = %request.url, "sending request");
        let timeout = request.timeout;
        let response = self
            .build(&request)
            .send()
            .await
            .map_err(|e| Self::map_error(e, timeout))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| Self::map_error(e, timeout))?;

        Ok(TransportResponse {
            status,
            headers,
            body,
            from_cache: false,
        })
    }

    async fn download(&self, request: TransportRequest) -> Result<DownloadStream> {
        debug!(method = %request.method, url = %request.url, "starting download");
        let timeout = request.timeout;
        let response = self
            .build(&request)
            .send()
            .await
            .map_err(|e| Self::map_error(e, timeout))?;

        let status = response.status().as_u16();
        let content_length = response.content_length();
        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map_err(move |e| Self::map_error(e, timeout));

        Ok(DownloadStream {
            status,
            content_length,
            headers,
            body: Box::pin(body),
        })
    }

    fn name(&self) -> &'static str {
        "reqwest"
    }
}
