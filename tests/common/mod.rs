//! Scripted in-process transport for deterministic engine tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use reqcache::cache::{CacheStore, CachedResponse};
use reqcache::transport::{
    DownloadStream, Transport, TransportError, TransportRequest, TransportResponse,
};
use reqcache::{Error, Result, Session, SessionBuilder};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

pub const BASE_URL: &str = "https://api.example.com";

#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16, Bytes),
    /// Fail without a response (connection refused, reset, ...).
    Fail,
    /// Never answer.
    Hang,
    Delayed(Duration, Box<Reply>),
}

impl Reply {
    pub fn ok(body: &'static str) -> Self {
        Reply::Status(200, Bytes::from_static(body.as_bytes()))
    }

    pub fn status(status: u16) -> Self {
        Reply::Status(status, Bytes::from_static(b"error"))
    }
}

pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    default: Reply,
    calls: AtomicUsize,
    requests: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
    /// Answers `200 ok` once the script runs out.
    pub fn new() -> Arc<Self> {
        Self::with_default(Reply::ok("ok"))
    }

    pub fn with_default(default: Reply) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            default,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, reply: Reply) -> &Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, request: TransportRequest) -> Reply {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default.clone())
    }
}

async fn play(mut reply: Reply) -> Result<(u16, Bytes)> {
    loop {
        match reply {
            Reply::Status(status, body) => return Ok((status, body)),
            Reply::Fail => {
                return Err(Error::Transport(TransportError::Other(
                    "scripted failure".to_string(),
                )))
            }
            Reply::Hang => futures::future::pending::<()>().await,
            Reply::Delayed(delay, next) => {
                tokio::time::sleep(delay).await;
                reply = *next;
            }
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        let reply = self.next(request);
        let (status, body) = play(reply).await?;
        Ok(TransportResponse::new(status, body))
    }

    async fn download(&self, request: TransportRequest) -> Result<DownloadStream> {
        let reply = self.next(request);
        let (status, body) = play(reply).await?;
        let chunks: Vec<Result<Bytes>> = body
            .chunks(4)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(DownloadStream {
            status,
            content_length: Some(body.len() as u64),
            headers: Default::default(),
            body: Box::pin(futures::stream::iter(chunks)),
        })
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

pub fn builder(transport: &Arc<ScriptedTransport>) -> SessionBuilder {
    Session::builder()
        .base_url(BASE_URL)
        .transport(transport.clone())
}

pub fn session(transport: &Arc<ScriptedTransport>) -> Session {
    builder(transport).build().unwrap()
}

/// Put an entry of the given age straight into the session's store.
pub fn seed(session: &Session, fingerprint: &str, body: &'static str, age: Duration) {
    session.cache().store().put(
        fingerprint,
        CachedResponse::stored_at(200, body, SystemTime::now() - age),
    );
}

pub fn stored(session: &Session, fingerprint: &str) -> Option<CachedResponse> {
    session.cache().store().get(fingerprint)
}

/// Wait until the session has `n` network tasks running.
pub async fn wait_for_inflight(session: &Session, n: usize) {
    for _ in 0..200 {
        if session.inflight_tasks().len() == n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("expected {} in-flight tasks", n);
}
