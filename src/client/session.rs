use crate::cache::{fingerprint, CacheExpiry, CacheStats, ResponseCache};
use crate::client::delivery::DeliveryQueue;
use crate::client::endpoint::Endpoint;
use crate::client::inflight::InflightTable;
use crate::client::signals::SessionSignals;
use crate::decode::ResponseDecoder;
use crate::resilience::ThrottleTable;
use crate::transport::Transport;
use crate::types::{Method, RequestDescriptor, Response, Task, TaskId};
use crate::{Error, Result};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;
use url::Url;

/// Per-request expiry override; `None` keeps the session default.
pub type ExpiryOverride = Arc<dyn Fn(&RequestDescriptor) -> Option<CacheExpiry> + Send + Sync>;

/// Whether the query string is part of a request's cache fingerprint.
pub type QueryInFingerprint = Arc<dyn Fn(&RequestDescriptor) -> bool + Send + Sync>;

/// Called when a delivered status is in the unauthorized set. Returning `false`
/// rejects the result if the session is configured to do so.
pub type UnauthorizedHandler = Arc<dyn Fn(&Task, u16) -> bool + Send + Sync>;

/// Resolved session configuration (see [`SessionBuilder`](crate::client::SessionBuilder)).
#[derive(Clone)]
pub struct SessionConfig {
    pub base_url: Option<Url>,
    pub default_timeout: Duration,
    pub disabled_methods: BTreeSet<Method>,
    pub unauthorized_statuses: BTreeSet<u16>,
    pub unauthorized_handler: Option<UnauthorizedHandler>,
    pub reject_on_unauthorized: bool,
    pub expiry_override: Option<ExpiryOverride>,
    pub query_in_fingerprint: Option<QueryInFingerprint>,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("default_timeout", &self.default_timeout)
            .field("disabled_methods", &self.disabled_methods)
            .field("unauthorized_statuses", &self.unauthorized_statuses)
            .field("unauthorized_handler", &self.unauthorized_handler.is_some())
            .field("reject_on_unauthorized", &self.reject_on_unauthorized)
            .field("expiry_override", &self.expiry_override.is_some())
            .field("query_in_fingerprint", &self.query_in_fingerprint.is_some())
            .finish()
    }
}

pub(crate) struct SessionInner {
    pub(crate) config: SessionConfig,
    pub(crate) cache: ResponseCache,
    pub(crate) throttles: ThrottleTable,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) decoder: Arc<dyn ResponseDecoder>,
    pub(crate) inflight: InflightTable,
    pub(crate) delivery: DeliveryQueue,
    offline: AtomicBool,
    next_task: AtomicU64,
    next_endpoint: AtomicU64,
}

/// A logical session: one cache, one throttle table, one transport and the set
/// of requests currently in flight.
///
/// Cloning is cheap and every clone refers to the same session.
#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Arc<SessionInner>,
}

impl Session {
    pub(crate) fn from_parts(
        config: SessionConfig,
        cache: ResponseCache,
        transport: Arc<dyn Transport>,
        decoder: Arc<dyn ResponseDecoder>,
        offline: bool,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                config,
                cache,
                throttles: ThrottleTable::new(),
                transport,
                decoder,
                inflight: InflightTable::new(),
                delivery: DeliveryQueue::new(),
                offline: AtomicBool::new(offline),
                next_task: AtomicU64::new(1),
                next_endpoint: AtomicU64::new(1),
            }),
        }
    }

    /// Create a session with default configuration (in-memory cache, reqwest transport).
    pub fn new() -> Result<Self> {
        crate::client::SessionBuilder::new().build()
    }

    pub fn builder() -> crate::client::SessionBuilder {
        crate::client::SessionBuilder::new()
    }

    /// Create a new request handle bound to this session.
    pub fn endpoint(&self) -> Endpoint {
        let id = self.inner.next_endpoint.fetch_add(1, Ordering::Relaxed);
        Endpoint::new(self.clone(), id)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Simulated offline mode: every dispatch fails with [`Error::Offline`]
    /// before anything else is checked.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
        info!(offline, "offline simulation toggled");
    }

    pub fn is_offline(&self) -> bool {
        self.inner.offline.load(Ordering::SeqCst)
    }

    /// Cancel one in-flight task. Its dispatch resolves to [`Error::Cancelled`].
    pub fn cancel(&self, id: TaskId) -> bool {
        self.inner.inflight.cancel(id)
    }

    pub fn cancel_all(&self) -> usize {
        self.inner.inflight.cancel_all()
    }

    pub fn inflight_tasks(&self) -> Vec<Task> {
        self.inner.inflight.tasks()
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.inner.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    pub fn throttles(&self) -> &ThrottleTable {
        &self.inner.throttles
    }

    pub fn decoder(&self) -> &Arc<dyn ResponseDecoder> {
        &self.inner.decoder
    }

    pub fn transport_name(&self) -> &'static str {
        self.inner.transport.name()
    }

    /// Snapshot current session state (facts only).
    pub fn signals(&self) -> SessionSignals {
        SessionSignals {
            inflight: self.inner.inflight.len(),
            throttle_keys: self.inner.throttles.len(),
            cache_entries: self.inner.cache.len(),
            cache: self.inner.cache.stats(),
            offline: self.is_offline(),
            counters: self.inner.inflight.counters().snapshot(),
        }
    }

    /// Dispatch in the background and hand the result to `callback` on the
    /// session's delivery worker. Callbacks of one session never run
    /// concurrently.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit<F>(
        &self,
        endpoint: &Endpoint,
        request: RequestDescriptor,
        callback: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(Endpoint, Result<Response>) + Send + 'static,
    {
        let endpoint = endpoint.clone();
        let session = self.clone();
        tokio::spawn(async move {
            let result = endpoint.dispatch(request).await;
            session
                .inner
                .delivery
                .deliver(Box::new(move || callback(endpoint, result)));
        })
    }

    /// Resolve a descriptor URL against the base URL.
    ///
    /// Absolute `http`/`https` URLs are used as-is. Relative URLs are appended to
    /// the base URL's path.
    pub fn compose_url(&self, raw: &str) -> Result<Url> {
        let bad = |reason: &str| Error::BadUrl {
            url: raw.to_string(),
            reason: reason.to_string(),
        };
        if raw.trim().is_empty() {
            return Err(bad("empty URL"));
        }
        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = self
                    .inner
                    .config
                    .base_url
                    .as_ref()
                    .ok_or_else(|| bad("relative URL without a base URL"))?;
                base.join(raw.trim_start_matches('/'))
                    .map_err(|e| bad(&e.to_string()))?
            }
            Err(e) => return Err(bad(&e.to_string())),
        };
        if !matches!(url.scheme(), "http" | "https") {
            return Err(bad("unsupported scheme"));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(bad("missing host"));
        }
        Ok(url)
    }

    /// Expiry policy in effect for `request`.
    pub fn expiry_for(&self, request: &RequestDescriptor) -> CacheExpiry {
        self.inner
            .config
            .expiry_override
            .as_ref()
            .and_then(|f| f(request))
            .unwrap_or_else(|| self.inner.cache.default_expiry())
    }

    /// Cache fingerprint of `request` once composed into `url`.
    pub fn fingerprint_for(&self, request: &RequestDescriptor, url: &Url) -> String {
        let include_query = self
            .inner
            .config
            .query_in_fingerprint
            .as_ref()
            .map_or(true, |f| f(request));
        fingerprint(url, include_query)
    }

    pub(crate) fn next_task_id(&self) -> TaskId {
        TaskId(self.inner.next_task.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.inner.config)
            .field("cache", &self.inner.cache.backend_name())
            .field("transport", &self.inner.transport.name())
            .field("offline", &self.is_offline())
            .finish()
    }
}
