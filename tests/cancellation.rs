//! In-flight bookkeeping, cancellation and callback delivery.

mod common;

use common::{seed, session, wait_for_inflight, Reply, ScriptedTransport};
use reqcache::{Error, Provenance, RequestDescriptor};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

#[tokio::test]
async fn test_cancel_by_task_id() {
    let transport = ScriptedTransport::with_default(Reply::Hang);
    let session = session(&transport);
    seed(&session, "api.example.com/other", "cached", Duration::ZERO);

    let endpoint = session.endpoint();
    let running = {
        let endpoint = endpoint.clone();
        tokio::spawn(async move {
            endpoint
                .dispatch_with(
                    RequestDescriptor::get("/slow"),
                    reqcache::DispatchOptions::new().with_timeout(Duration::from_secs(30)),
                )
                .await
        })
    };

    wait_for_inflight(&session, 1).await;
    let task = session.inflight_tasks().remove(0);
    assert_eq!(task.provenance(), Provenance::Network);
    assert_eq!(task.request().url(), "/slow");
    assert_eq!(endpoint.current_task(), task.id());

    assert!(session.cancel(task.id().unwrap()));
    let result = running.await.unwrap();
    assert!(matches!(result, Err(Error::Cancelled)));

    let signals = session.signals();
    assert_eq!(signals.inflight, 0);
    assert_eq!(signals.counters.dispatched, 1);
    assert_eq!(signals.counters.cancelled, 1);
    assert_eq!(signals.counters.completed, 0);
    assert!(endpoint.current_task().is_none());
    // cached entries are untouched
    assert_eq!(session.cache().len(), 1);
}

#[tokio::test]
async fn test_cancel_unknown_task_is_a_noop() {
    let transport = ScriptedTransport::new();
    let session = session(&transport);
    let endpoint = session.endpoint();
    let response = endpoint.dispatch(RequestDescriptor::get("/a")).await.unwrap();
    assert!(!session.cancel(response.task.id().unwrap()));
    assert!(!endpoint.cancel());
}

#[tokio::test]
async fn test_cancel_all() {
    let transport = ScriptedTransport::with_default(Reply::Hang);
    let session = session(&transport);

    let mut handles = Vec::new();
    for path in ["/a", "/b", "/c"] {
        let endpoint = session.endpoint();
        handles.push(tokio::spawn(async move {
            endpoint.dispatch(RequestDescriptor::get(path)).await
        }));
    }
    wait_for_inflight(&session, 3).await;

    assert_eq!(session.cancel_all(), 3);
    for handle in handles {
        assert!(handle.await.unwrap().unwrap_err().is_cancelled());
    }
    assert_eq!(session.signals().counters.cancelled, 3);
    assert!(session.inflight_tasks().is_empty());
}

#[tokio::test]
async fn test_redispatch_on_endpoint_cancels_running_task() {
    let transport = ScriptedTransport::new();
    transport.push(Reply::Hang).push(Reply::ok("second"));
    let session = session(&transport);
    let endpoint = session.endpoint();

    let first = {
        let endpoint = endpoint.clone();
        tokio::spawn(async move { endpoint.dispatch(RequestDescriptor::get("/a")).await })
    };
    wait_for_inflight(&session, 1).await;

    let second = endpoint.dispatch(RequestDescriptor::get("/b")).await.unwrap();
    assert_eq!(&second.body[..], b"second");
    assert!(first.await.unwrap().unwrap_err().is_cancelled());
    assert_eq!(session.inflight_tasks().len(), 0);
}

#[tokio::test]
async fn test_download_on_endpoint_cancels_running_task() {
    let transport = ScriptedTransport::new();
    transport.push(Reply::Hang).push(Reply::ok("file body"));
    let session = session(&transport);
    let endpoint = session.endpoint();

    let first = {
        let endpoint = endpoint.clone();
        tokio::spawn(async move { endpoint.dispatch(RequestDescriptor::get("/a")).await })
    };
    wait_for_inflight(&session, 1).await;

    let download = endpoint
        .download(RequestDescriptor::get("/file"), |_| {})
        .await
        .unwrap();
    assert_eq!(&download.body[..], b"file body");
    assert!(first.await.unwrap().unwrap_err().is_cancelled());
    assert!(session.inflight_tasks().is_empty());
    assert!(endpoint.current_task().is_none());
    assert_eq!(session.signals().counters.cancelled, 1);
}

#[tokio::test]
async fn test_endpoint_cancel() {
    let transport = ScriptedTransport::with_default(Reply::Hang);
    let session = session(&transport);
    let endpoint = session.endpoint();

    let running = {
        let endpoint = endpoint.clone();
        tokio::spawn(async move { endpoint.get("/slow").await })
    };
    wait_for_inflight(&session, 1).await;
    assert!(endpoint.cancel());
    assert!(running.await.unwrap().unwrap_err().is_cancelled());
}

#[tokio::test]
async fn test_dropping_dispatch_future_clears_inflight_entry() {
    let transport = ScriptedTransport::with_default(Reply::Hang);
    let session = session(&transport);
    let endpoint = session.endpoint();

    let result = tokio::time::timeout(Duration::from_millis(20), endpoint.get("/slow")).await;
    assert!(result.is_err());
    assert!(session.inflight_tasks().is_empty());
}

#[tokio::test]
async fn test_submit_delivers_through_callback() {
    let transport = ScriptedTransport::new();
    transport.push(Reply::ok("one"));
    let session = session(&transport);
    let endpoint = session.endpoint();

    let (tx, rx) = oneshot::channel();
    session.submit(&endpoint, RequestDescriptor::get("/one"), move |ep, result| {
        let _ = tx.send((ep.id(), result.map(|r| r.body)));
    });

    let (id, body) = rx.await.unwrap();
    assert_eq!(id, endpoint.id());
    assert_eq!(&body.unwrap()[..], b"one");
}

#[tokio::test]
async fn test_submitted_callbacks_run_one_at_a_time() {
    let transport = ScriptedTransport::new();
    for delay in [30u64, 10, 20] {
        transport.push(Reply::Delayed(
            Duration::from_millis(delay),
            Box::new(Reply::ok("ok")),
        ));
    }
    let session = session(&transport);

    let active = Arc::new(Mutex::new(0usize));
    let overlaps = Arc::new(Mutex::new(0usize));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    for path in ["/a", "/b", "/c"] {
        let active = active.clone();
        let overlaps = overlaps.clone();
        let tx = tx.clone();
        session.submit(
            &session.endpoint(),
            RequestDescriptor::get(path),
            move |_, result| {
                {
                    let mut n = active.lock().unwrap();
                    *n += 1;
                    if *n > 1 {
                        *overlaps.lock().unwrap() += 1;
                    }
                }
                std::thread::sleep(Duration::from_millis(5));
                *active.lock().unwrap() -= 1;
                let _ = tx.send(result.is_ok());
            },
        );
    }

    for _ in 0..3 {
        assert!(rx.recv().await.unwrap());
    }
    assert_eq!(*overlaps.lock().unwrap(), 0);
}
