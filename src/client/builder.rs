use crate::cache::{CacheConfig, CacheExpiry, CacheStore, MemoryStore, ResponseCache};
use crate::client::session::{
    ExpiryOverride, QueryInFingerprint, Session, SessionConfig, UnauthorizedHandler,
};
use crate::decode::{JsonDecoder, ResponseDecoder};
use crate::resilience::saturating_millis;
use crate::transport::{HttpTransport, Transport};
use crate::types::{Method, RequestDescriptor, Task};
use crate::{Error, ErrorContext, Result};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Builder for creating sessions with custom configuration.
///
/// Environment overrides are read once in [`build`](Self::build); values set on
/// the builder always win:
/// - `REQCACHE_TIMEOUT_SECS` (default request timeout, default 30)
/// - `REQCACHE_MEMORY_CAPACITY` (in-memory store capacity when no store is
///   supplied, default 256)
/// - `REQCACHE_OFFLINE` (`1` starts the session offline)
pub struct SessionBuilder {
    base_url: Option<String>,
    store: Option<Arc<dyn CacheStore>>,
    cache: CacheConfig,
    expiry_override: Option<ExpiryOverride>,
    query_in_fingerprint: Option<QueryInFingerprint>,
    disabled_methods: BTreeSet<Method>,
    unauthorized_statuses: BTreeSet<u16>,
    unauthorized_handler: Option<UnauthorizedHandler>,
    reject_on_unauthorized: bool,
    timeout: Option<Duration>,
    transport: Option<Arc<dyn Transport>>,
    decoder: Option<Arc<dyn ResponseDecoder>>,
    offline: Option<bool>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            store: None,
            cache: CacheConfig::default(),
            expiry_override: None,
            query_in_fingerprint: None,
            disabled_methods: BTreeSet::new(),
            unauthorized_statuses: BTreeSet::from([401, 403]),
            unauthorized_handler: None,
            reject_on_unauthorized: false,
            timeout: None,
            transport: None,
            decoder: None,
            offline: None,
        }
    }

    /// Base URL relative request URLs are resolved against.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Cache store. Defaults to a bounded [`MemoryStore`].
    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn default_expiry(mut self, expiry: CacheExpiry) -> Self {
        self.cache.default_expiry = expiry;
        self
    }

    /// Turn the response cache off entirely (no lookups, no writes).
    pub fn caching(mut self, enabled: bool) -> Self {
        self.cache.enabled = enabled;
        self
    }

    /// Bodies larger than `bytes` are not cached.
    pub fn max_cache_entry_size(mut self, bytes: usize) -> Self {
        self.cache.max_entry_size = bytes;
        self
    }

    /// Override the expiry policy per request.
    pub fn expiry_override<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestDescriptor) -> Option<CacheExpiry> + Send + Sync + 'static,
    {
        self.expiry_override = Some(Arc::new(f));
        self
    }

    /// Decide per request whether the query string is part of the cache
    /// fingerprint. Included by default.
    pub fn query_in_fingerprint<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestDescriptor) -> bool + Send + Sync + 'static,
    {
        self.query_in_fingerprint = Some(Arc::new(f));
        self
    }

    /// Reject every request of this method with [`Error::RequestTypeDisabled`].
    pub fn disable_method(mut self, method: Method) -> Self {
        self.disabled_methods.insert(method);
        self
    }

    /// Replace the unauthorized status set (default `{401, 403}`).
    pub fn unauthorized_statuses<I: IntoIterator<Item = u16>>(mut self, statuses: I) -> Self {
        self.unauthorized_statuses = statuses.into_iter().collect();
        self
    }

    pub fn on_unauthorized<F>(mut self, f: F) -> Self
    where
        F: Fn(&Task, u16) -> bool + Send + Sync + 'static,
    {
        self.unauthorized_handler = Some(Arc::new(f));
        self
    }

    /// When the unauthorized handler returns `false`, deliver
    /// [`Error::Unauthorized`] instead of the result. Off by default.
    pub fn reject_on_unauthorized(mut self, reject: bool) -> Self {
        self.reject_on_unauthorized = reject;
        self
    }

    /// Default per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn ResponseDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Start in simulated offline mode.
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = Some(offline);
        self
    }

    /// Build the session.
    pub fn build(self) -> Result<Session> {
        let base_url = match self.base_url {
            Some(raw) => Some(parse_base_url(&raw)?),
            None => None,
        };

        let timeout = self.timeout.unwrap_or_else(|| {
            Duration::from_secs(
                std::env::var("REQCACHE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(30),
            )
        });
        if timeout.is_zero() {
            return Err(Error::configuration_with_context(
                "timeout must be greater than zero",
                ErrorContext::new().with_source("session_builder"),
            ));
        }

        let store = self.store.unwrap_or_else(|| {
            let capacity = std::env::var("REQCACHE_MEMORY_CAPACITY")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(256);
            Arc::new(MemoryStore::new(capacity))
        });

        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpTransport::new()?),
        };

        let decoder = self
            .decoder
            .unwrap_or_else(|| Arc::new(JsonDecoder::default()));

        let offline = self.offline.unwrap_or_else(|| {
            std::env::var("REQCACHE_OFFLINE").ok().as_deref() == Some("1")
        });

        debug!(
            store = store.name(),
            transport = transport.name(),
            decoder = decoder.name(),
            timeout_ms = saturating_millis(timeout),
            "building session"
        );

        let config = SessionConfig {
            base_url,
            default_timeout: timeout,
            disabled_methods: self.disabled_methods,
            unauthorized_statuses: self.unauthorized_statuses,
            unauthorized_handler: self.unauthorized_handler,
            reject_on_unauthorized: self.reject_on_unauthorized,
            expiry_override: self.expiry_override,
            query_in_fingerprint: self.query_in_fingerprint,
        };

        Ok(Session::from_parts(
            config,
            ResponseCache::new(self.cache, store),
            transport,
            decoder,
            offline,
        ))
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let invalid = |details: String| {
        Error::configuration_with_context(
            "invalid base URL",
            ErrorContext::new()
                .with_url(raw)
                .with_details(details)
                .with_source("session_builder"),
        )
    };
    let mut url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(invalid("base URL must be an absolute http(s) URL".to_string()));
    }
    // Relative paths are appended, so the base path must end in a slash.
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
