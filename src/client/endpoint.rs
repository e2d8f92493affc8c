//! Session-bound request handles.

use crate::cache::CacheExpiry;
use crate::client::download::{DownloadProgress, DownloadedFile};
use crate::client::session::Session;
use crate::resilience::{Throttle, ThrottleKeyPolicy};
use crate::types::{RequestDescriptor, Response, Task, TaskId};
use crate::Result;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Whether a request may be answered from (or fall back to) the response cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    #[default]
    Normal,
    /// Always go to the network and never substitute a cached entry on failure.
    /// Successful responses are still written.
    Ignore,
}

/// Per-dispatch overrides.
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    /// Overrides the endpoint's cache policy.
    pub cache_policy: Option<CachePolicy>,
    /// Overrides the session's expiry policy for this request.
    pub expiry: Option<CacheExpiry>,
    /// Overrides both the descriptor's and the session's timeout.
    pub timeout: Option<Duration>,
}

impl DispatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = Some(policy);
        self
    }

    pub fn with_expiry(mut self, expiry: CacheExpiry) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Default)]
pub(crate) struct EndpointState {
    pub(crate) mock_body: Option<Bytes>,
    pub(crate) mock_status: Option<u16>,
    pub(crate) cache_policy: CachePolicy,
    pub(crate) throttle: Option<Throttle>,
    pub(crate) key_policy: ThrottleKeyPolicy,
    pub(crate) current: Option<TaskId>,
    pub(crate) last_task: Option<Task>,
}

impl EndpointState {
    /// Take the mock data, if any. Mock data is good for one dispatch.
    pub(crate) fn take_mock(&mut self) -> Option<(u16, Bytes)> {
        if self.mock_body.is_none() && self.mock_status.is_none() {
            return None;
        }
        let status = self.mock_status.take().unwrap_or(200);
        let body = self.mock_body.take().unwrap_or_default();
        Some((status, body))
    }
}

/// A request handle bound to a [`Session`].
///
/// An endpoint runs at most one network task at a time: dispatching again
/// while a task is running cancels that task first. Clones share state.
#[derive(Clone)]
pub struct Endpoint {
    session: Session,
    id: u64,
    state: Arc<Mutex<EndpointState>>,
}

impl Endpoint {
    pub(crate) fn new(session: Session, id: u64) -> Self {
        Self {
            session,
            id,
            state: Arc::new(Mutex::new(EndpointState::default())),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Answer the next dispatch with this body (status 200 unless set).
    pub fn set_mock_data(&self, body: impl Into<Bytes>) -> &Self {
        self.state().mock_body = Some(body.into());
        self
    }

    /// Answer the next dispatch with this status (empty body unless set).
    pub fn set_mock_status(&self, status: u16) -> &Self {
        self.state().mock_status = Some(status);
        self
    }

    pub fn set_mock(&self, status: u16, body: impl Into<Bytes>) -> &Self {
        let mut state = self.state();
        state.mock_status = Some(status);
        state.mock_body = Some(body.into());
        drop(state);
        self
    }

    pub fn clear_mock(&self) -> &Self {
        let mut state = self.state();
        state.mock_status = None;
        state.mock_body = None;
        drop(state);
        self
    }

    pub fn has_mock(&self) -> bool {
        let state = self.state();
        state.mock_body.is_some() || state.mock_status.is_some()
    }

    pub fn set_cache_policy(&self, policy: CachePolicy) -> &Self {
        self.state().cache_policy = policy;
        self
    }

    pub fn cache_policy(&self) -> CachePolicy {
        self.state().cache_policy
    }

    /// Throttle every request of this endpoint; `None` removes the throttle.
    pub fn set_throttle(&self, throttle: Option<Throttle>) -> &Self {
        self.state().throttle = throttle;
        self
    }

    pub fn throttle(&self) -> Option<Throttle> {
        self.state().throttle
    }

    pub fn set_throttle_key_policy(&self, policy: ThrottleKeyPolicy) -> &Self {
        self.state().key_policy = policy;
        self
    }

    /// The network task currently running, if any.
    pub fn current_task(&self) -> Option<TaskId> {
        self.state().current
    }

    /// Task created by the most recent dispatch (none for throttled or
    /// rejected requests).
    pub fn last_task(&self) -> Option<Task> {
        self.state().last_task.clone()
    }

    /// Cancel the running network task. Returns false when nothing was running.
    pub fn cancel(&self) -> bool {
        self.state().current = None;
        let running = self.session.inner.inflight.tasks_for_endpoint(self.id);
        running
            .into_iter()
            .fold(false, |any, id| self.session.cancel(id) || any)
    }

    pub async fn dispatch(&self, request: RequestDescriptor) -> Result<Response> {
        self.dispatch_with(request, DispatchOptions::default()).await
    }

    /// Resolve `request`: mock data, throttle, cache, then the network.
    pub async fn dispatch_with(
        &self,
        request: RequestDescriptor,
        options: DispatchOptions,
    ) -> Result<Response> {
        crate::client::resolver::resolve(self, request, options).await
    }

    pub async fn get(&self, url: impl Into<String>) -> Result<Bytes> {
        Ok(self.dispatch(RequestDescriptor::get(url)).await?.body)
    }

    pub async fn post(&self, url: impl Into<String>, body: impl Into<Bytes>) -> Result<Bytes> {
        Ok(self
            .dispatch(RequestDescriptor::post(url).with_body(body))
            .await?
            .body)
    }

    pub async fn put(&self, url: impl Into<String>, body: impl Into<Bytes>) -> Result<Bytes> {
        Ok(self
            .dispatch(RequestDescriptor::put(url).with_body(body))
            .await?
            .body)
    }

    pub async fn patch(&self, url: impl Into<String>, body: impl Into<Bytes>) -> Result<Bytes> {
        Ok(self
            .dispatch(RequestDescriptor::patch(url).with_body(body))
            .await?
            .body)
    }

    pub async fn delete(&self, url: impl Into<String>) -> Result<Bytes> {
        Ok(self.dispatch(RequestDescriptor::delete(url)).await?.body)
    }

    /// GET and decode the body with the session's decoder.
    pub async fn get_json<T: DeserializeOwned>(&self, url: impl Into<String>) -> Result<T> {
        let response = self.dispatch(RequestDescriptor::get(url)).await?;
        self.decode(&response)
    }

    /// Send `body` as JSON with `request`'s method and URL, and decode the reply.
    pub async fn send_json<B, T>(&self, request: RequestDescriptor, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.dispatch(request.with_json(body)?).await?;
        self.decode(&response)
    }

    /// Decode a response with the session's decoder.
    pub fn decode<T: DeserializeOwned>(&self, response: &Response) -> Result<T> {
        response.decode(self.session.decoder().as_ref())
    }

    /// Stream the response body into memory, reporting progress per chunk.
    /// Downloads never read or write the response cache.
    pub async fn download<F>(&self, request: RequestDescriptor, progress: F) -> Result<Response>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        crate::client::download::download(self, request, progress).await
    }

    /// Stream the response body into `path`.
    pub async fn download_to<F>(
        &self,
        request: RequestDescriptor,
        path: impl AsRef<Path>,
        progress: F,
    ) -> Result<DownloadedFile>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        crate::client::download::download_to(self, request, path.as_ref(), progress).await
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, EndpointState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("state", &*self.state())
            .finish()
    }
}
