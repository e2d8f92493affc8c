//! Streaming downloads with progress reporting.

use crate::client::classification::StatusFamily;
use crate::client::endpoint::Endpoint;
use crate::client::resolver::{check_throttle, prepare, reset, run_tracked};
use crate::transport::{DownloadStream, TransportRequest};
use crate::types::{RequestDescriptor, Response, Task};
use crate::{Error, Result};
use bytes::BytesMut;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub received: u64,
    /// From `Content-Length`, when the server sent one.
    pub total: Option<u64>,
}

impl DownloadProgress {
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(1.0),
            Some(total) => Some((self.received as f64 / total as f64).min(1.0)),
            None => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub task: Task,
    pub status: u16,
    pub path: PathBuf,
    pub bytes: u64,
}

pub(crate) async fn download<F>(
    endpoint: &Endpoint,
    request: RequestDescriptor,
    mut progress: F,
) -> Result<Response>
where
    F: FnMut(DownloadProgress) + Send,
{
    let (request, transport_request) = start(endpoint, request)?;
    let transport = endpoint.session().inner.transport.clone();

    let work = async move {
        let stream = transport.download(transport_request).await?;
        let status = stream.status;
        let headers = stream.headers.clone();
        let mut body = BytesMut::new();
        drain(stream, &mut progress, Sink::Memory(&mut body)).await?;
        Ok::<_, Error>((status, headers, body.freeze()))
    };

    let (task, outcome) = run_tracked(endpoint, &request, work).await?;
    let (status, headers, body) = outcome?;
    if !StatusFamily::of(status).is_success() {
        return Err(Error::HttpStatus { status, body });
    }
    debug!(task_id = task.id().map(|id| id.get()), bytes = body.len(), "download finished");
    Ok(Response {
        task,
        status,
        headers,
        body,
        cached_at: None,
    })
}

/// Stream into `path`. The body is written to a sibling temporary file and
/// moved into place only when the transfer succeeded with a 2xx status.
pub(crate) async fn download_to<F>(
    endpoint: &Endpoint,
    request: RequestDescriptor,
    path: &Path,
    mut progress: F,
) -> Result<DownloadedFile>
where
    F: FnMut(DownloadProgress) + Send,
{
    let (request, transport_request) = start(endpoint, request)?;
    let transport = endpoint.session().inner.transport.clone();
    let tmp = temp_path(path);
    let tmp_for_work = tmp.clone();

    let work = async move {
        let stream = transport.download(transport_request).await?;
        let status = stream.status;
        if !StatusFamily::of(status).is_success() {
            let mut body = BytesMut::new();
            drain(stream, &mut |_: DownloadProgress| {}, Sink::Memory(&mut body)).await?;
            return Err(Error::HttpStatus {
                status,
                body: body.freeze(),
            });
        }

        let mut file = tokio::fs::File::create(&tmp_for_work).await?;
        let written = drain(stream, &mut progress, Sink::File(&mut file)).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok::<_, Error>((status, written))
    };

    let result = run_tracked(endpoint, &request, work).await;
    let (task, (status, bytes)) = match result {
        Ok((task, Ok(done))) => (task, done),
        Ok((_, Err(e))) | Err(e) => {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
    };
    tokio::fs::rename(&tmp, path).await?;
    debug!(task_id = task.id().map(|id| id.get()), bytes, path = %path.display(), "download saved");
    Ok(DownloadedFile {
        task,
        status,
        path: path.to_path_buf(),
        bytes,
    })
}

/// Offline/URL/method/throttle checks shared by both download flavours. Like
/// a dispatch, a download first cancels the endpoint's running task.
fn start(
    endpoint: &Endpoint,
    request: RequestDescriptor,
) -> Result<(Arc<RequestDescriptor>, TransportRequest)> {
    reset(endpoint);
    let request = Arc::new(request);
    let url = prepare(endpoint, &request)?;
    check_throttle(endpoint, &url)?;

    let mut headers = request.headers().to_vec();
    if request.header("x-request-id").is_none() {
        headers.push(("x-request-id".to_string(), Uuid::new_v4().to_string()));
    }
    let transport_request = TransportRequest {
        method: request.method(),
        url,
        headers,
        body: request.body().cloned(),
        timeout: request
            .timeout()
            .unwrap_or(endpoint.session().config().default_timeout),
    };
    Ok((request, transport_request))
}

enum Sink<'a> {
    Memory(&'a mut BytesMut),
    File(&'a mut tokio::fs::File),
}

impl Sink<'_> {
    async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        match self {
            Sink::Memory(buf) => {
                buf.extend_from_slice(chunk);
                Ok(())
            }
            Sink::File(file) => Ok(file.write_all(chunk).await?),
        }
    }
}

/// Feed every chunk to `sink`, reporting progress after each one. Returns the
/// number of bytes received.
async fn drain<P>(stream: DownloadStream, progress: &mut P, mut sink: Sink<'_>) -> Result<u64>
where
    P: FnMut(DownloadProgress),
{
    let total = stream.content_length;
    let mut body = stream.body;
    let mut received = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        received += chunk.len() as u64;
        sink.write(&chunk).await?;
        progress(DownloadProgress { received, total });
    }
    Ok(received)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}
