//! Request resolution.
//!
//! Every dispatch walks the same steps, in order, and stops at the first one
//! that produces a result:
//!
//! 1. simulated offline mode
//! 2. URL composition
//! 3. disabled request methods
//! 4. endpoint mock data (consumed)
//! 5. throttle
//! 6. response cache (normal cache policy, GET only)
//! 7. network
//!
//! A network completion is then classified; failures may be replaced by a
//! contingent cache entry, successes reconcile the stale entry seen in step 6
//! and are written to the cache. The unauthorized handler sees whatever status
//! is finally delivered.

use crate::cache::{CacheExpiry, CachedResponse, Lookup};
use crate::client::classification::StatusFamily;
use crate::client::endpoint::{CachePolicy, DispatchOptions, Endpoint};
use crate::client::policy::{decide, Decision};
use crate::client::session::Session;
use crate::resilience::throttle_key;
use crate::transport::{TransportError, TransportRequest, TransportResponse};
use crate::types::{Provenance, RequestDescriptor, Response, Task};
use crate::{Error, Result};
use bytes::Bytes;
use futures::future::{abortable, Aborted};
use reqwest::header::HeaderMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

pub(crate) async fn resolve(
    endpoint: &Endpoint,
    request: RequestDescriptor,
    options: DispatchOptions,
) -> Result<Response> {
    let session = endpoint.session();
    reset(endpoint);

    let request = Arc::new(request);
    let url = prepare(endpoint, &request)?;

    let mock = endpoint.state().take_mock();
    if let Some((status, body)) = mock {
        let task = Task::new(None, request.clone(), Provenance::Mock);
        endpoint.state().last_task = Some(task.clone());
        debug!(url = %url, status, "serving mock data");
        return finish_local(session, task, status, body, None);
    }

    check_throttle(endpoint, &url)?;

    let cache_policy = options
        .cache_policy
        .unwrap_or_else(|| endpoint.cache_policy());
    let expiry = options
        .expiry
        .unwrap_or_else(|| session.expiry_for(&request));
    let fingerprint = request
        .method()
        .is_cacheable()
        .then(|| session.fingerprint_for(&request, &url));

    let mut stale = None;
    if let (Some(fp), CachePolicy::Normal) = (fingerprint.as_deref(), cache_policy) {
        match session.cache().lookup(fp, expiry) {
            Lookup::Hit(entry) => {
                let task = Task::new(None, request.clone(), Provenance::AppCache);
                endpoint.state().last_task = Some(task.clone());
                return finish_local(session, task, entry.status, entry.body, Some(entry.timestamp));
            }
            Lookup::Miss { stale: s } => stale = s,
        }
    }

    let transport_request = build_transport_request(session, &request, url, options.timeout);
    let timeout = transport_request.timeout;
    let transport = session.inner.transport.clone();
    let send = async move {
        match tokio::time::timeout(timeout, transport.send(transport_request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Transport(TransportError::Timeout(timeout))),
        }
    };

    let (task, outcome) = run_tracked(endpoint, &request, send).await?;

    let completion = Completion {
        session,
        task,
        fingerprint: fingerprint.as_deref(),
        expiry,
        cache_policy,
        stale,
    };
    completion.finish(outcome)
}

/// Cancel whatever the endpoint was still running and forget its last task.
pub(crate) fn reset(endpoint: &Endpoint) {
    let previous = {
        let mut state = endpoint.state();
        state.last_task = None;
        state.current.take()
    };
    if let Some(id) = previous {
        if endpoint.session().cancel(id) {
            debug!(task_id = id.get(), endpoint = endpoint.id(), "cancelled previous task");
        }
    }
}

/// Steps 1-3: offline simulation, URL composition, disabled methods.
pub(crate) fn prepare(endpoint: &Endpoint, request: &Arc<RequestDescriptor>) -> Result<Url> {
    let session = endpoint.session();
    if session.is_offline() {
        return Err(Error::Offline);
    }

    let url = match session.compose_url(request.url()) {
        Ok(url) => url,
        Err(e) => {
            endpoint.state().last_task =
                Some(Task::new(None, request.clone(), Provenance::Invalid));
            warn!(url = request.url(), error = %e, "request URL did not compose");
            return Err(e);
        }
    };

    if session.config().disabled_methods.contains(&request.method()) {
        return Err(Error::RequestTypeDisabled {
            method: request.method(),
        });
    }
    Ok(url)
}

/// Step 5.
pub(crate) fn check_throttle(endpoint: &Endpoint, url: &Url) -> Result<()> {
    let (throttle, key_policy) = {
        let state = endpoint.state();
        (state.throttle, state.key_policy.clone())
    };
    let Some(throttle) = throttle else {
        return Ok(());
    };
    let key = throttle_key(url, &key_policy);
    if endpoint.session().throttles().should_throttle(&key, throttle) {
        info!(key = %key, count = throttle.count, "request throttled");
        return Err(Error::Throttled { key });
    }
    Ok(())
}

/// Run `work` as a tracked network task of `endpoint`.
///
/// The task is registered in the session's in-flight table for as long as it
/// runs and can be cancelled through it. A cancelled task, or one whose entry
/// disappeared before it could complete, resolves to [`Error::Cancelled`].
pub(crate) async fn run_tracked<F>(
    endpoint: &Endpoint,
    request: &Arc<RequestDescriptor>,
    work: F,
) -> Result<(Task, F::Output)>
where
    F: Future,
{
    let session = endpoint.session();
    let id = session.next_task_id();
    let task = Task::new(Some(id), request.clone(), Provenance::Network);

    let (work, abort) = abortable(work);
    let guard = session
        .inner
        .inflight
        .register(id, endpoint.id(), request.clone(), abort);
    {
        let mut state = endpoint.state();
        state.current = Some(id);
        state.last_task = Some(task.clone());
    }

    let result = work.await;

    {
        let mut state = endpoint.state();
        if state.current == Some(id) {
            state.current = None;
        }
    }

    let output = match result {
        Ok(output) => output,
        Err(Aborted) => {
            drop(guard);
            session.inner.inflight.counters().record_cancelled();
            info!(task_id = id.get(), "task cancelled before completion");
            return Err(Error::Cancelled);
        }
    };
    if !guard.complete() {
        return Err(Error::Cancelled);
    }
    session.inner.inflight.counters().record_completed();
    Ok((task, output))
}

fn build_transport_request(
    session: &Session,
    request: &RequestDescriptor,
    url: Url,
    timeout: Option<Duration>,
) -> TransportRequest {
    let mut headers = request.headers().to_vec();
    if request.header("x-request-id").is_none() {
        headers.push(("x-request-id".to_string(), Uuid::new_v4().to_string()));
    }
    TransportRequest {
        method: request.method(),
        url,
        headers,
        body: request.body().cloned(),
        timeout: timeout
            .or(request.timeout())
            .unwrap_or(session.config().default_timeout),
    }
}

/// A response that never touched the network (mock data or a cache hit).
fn finish_local(
    session: &Session,
    task: Task,
    status: u16,
    body: Bytes,
    cached_at: Option<std::time::SystemTime>,
) -> Result<Response> {
    intercept_unauthorized(session, &task, status)?;
    if StatusFamily::of(status).is_failure() {
        return Err(Error::HttpStatus { status, body });
    }
    Ok(Response {
        task,
        status,
        headers: HeaderMap::new(),
        body,
        cached_at,
    })
}

/// Give the unauthorized handler a look at `status`.
fn intercept_unauthorized(session: &Session, task: &Task, status: u16) -> Result<()> {
    let config = session.config();
    if !config.unauthorized_statuses.contains(&status) {
        return Ok(());
    }
    let Some(handler) = config.unauthorized_handler.as_ref() else {
        return Ok(());
    };
    if !handler(task, status) && config.reject_on_unauthorized {
        warn!(status, url = task.request().url(), "unauthorized response rejected");
        return Err(Error::Unauthorized { status });
    }
    Ok(())
}

struct Completion<'a> {
    session: &'a Session,
    task: Task,
    fingerprint: Option<&'a str>,
    expiry: CacheExpiry,
    cache_policy: CachePolicy,
    stale: Option<CachedResponse>,
}

impl Completion<'_> {
    fn finish(self, outcome: Result<TransportResponse>) -> Result<Response> {
        let fallback_allowed = self.fingerprint.is_some() && self.cache_policy == CachePolicy::Normal;
        match decide(&outcome, fallback_allowed) {
            Decision::Deliver => {
                let response = outcome?;
                self.deliver(response)
            }
            Decision::Fallback => match self.fallback() {
                Some(entry) => {
                    if let Err(e) = &outcome {
                        debug!(error = %e, "network failure masked by cached entry");
                    }
                    let task = self.task.clone().with_provenance(Provenance::AppCache);
                    finish_local(self.session, task, entry.status, entry.body, Some(entry.timestamp))
                }
                None => self.fail(outcome),
            },
            Decision::Fail => self.fail(outcome),
        }
    }

    fn deliver(self, response: TransportResponse) -> Result<Response> {
        let provenance = if response.from_cache {
            Provenance::SystemCache
        } else {
            Provenance::Network
        };
        let task = self.task.with_provenance(provenance);

        // a rejected result never reaches the cache
        intercept_unauthorized(self.session, &task, response.status)?;
        if StatusFamily::of(response.status).is_success() {
            if let Some(fp) = self.fingerprint {
                let cache = self.session.cache();
                if let Some(stale) = &self.stale {
                    if cache.reconcile_after_success(fp, self.expiry, stale) {
                        debug!(fingerprint = fp, "removed expired entry after refresh");
                    }
                }
                cache.write(fp, response.status, response.body.clone(), self.expiry);
            }
        }

        debug!(
            task_id = task.id().map(|id| id.get()),
            status = response.status,
            provenance = %task.provenance(),
            "delivering response"
        );
        Ok(Response {
            task,
            status: response.status,
            headers: response.headers,
            body: response.body,
            cached_at: None,
        })
    }

    fn fallback(&self) -> Option<CachedResponse> {
        let fp = self.fingerprint?;
        self.session.cache().fallback(fp, self.expiry)
    }

    fn fail(self, outcome: Result<TransportResponse>) -> Result<Response> {
        match outcome {
            Ok(response) => {
                intercept_unauthorized(self.session, &self.task, response.status)?;
                Err(Error::HttpStatus {
                    status: response.status,
                    body: response.body,
                })
            }
            Err(e) => Err(e),
        }
    }
}
