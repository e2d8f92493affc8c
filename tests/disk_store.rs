//! Sessions backed by the disk store.

mod common;

use common::{builder, Reply, ScriptedTransport};
use reqcache::cache::CacheStore;
use reqcache::{CacheExpiry, DiskStore, Provenance, RequestDescriptor};
use std::sync::Arc;
use std::time::Duration;

fn disk(dir: &tempfile::TempDir) -> Arc<dyn CacheStore> {
    Arc::new(DiskStore::new(dir.path()).unwrap())
}

#[tokio::test]
async fn test_entries_survive_a_new_session() {
    let dir = tempfile::tempdir().unwrap();

    let transport = ScriptedTransport::new();
    transport.push(Reply::ok("persisted"));
    let first = builder(&transport)
        .cache_store(disk(&dir))
        .default_expiry(CacheExpiry::Never)
        .build()
        .unwrap();
    let response = first
        .endpoint()
        .dispatch(RequestDescriptor::get("/profile"))
        .await
        .unwrap();
    assert_eq!(response.provenance(), Provenance::Network);
    assert_eq!(first.cache().len(), 1);
    drop(first);

    let offline_transport = ScriptedTransport::with_default(Reply::Fail);
    let second = builder(&offline_transport)
        .cache_store(disk(&dir))
        .default_expiry(CacheExpiry::Never)
        .build()
        .unwrap();
    let response = second
        .endpoint()
        .dispatch(RequestDescriptor::get("/profile"))
        .await
        .unwrap();
    assert_eq!(response.provenance(), Provenance::AppCache);
    assert_eq!(&response.body[..], b"persisted");
    assert!(response.cached_at.is_some());
    assert_eq!(offline_transport.calls(), 0);
}

#[tokio::test]
async fn test_custom_window_uses_file_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new();
    transport.push(Reply::ok("v1")).push(Reply::ok("v2"));
    let session = builder(&transport)
        .cache_store(disk(&dir))
        .default_expiry(CacheExpiry::Custom(Duration::from_millis(50)))
        .build()
        .unwrap();
    let endpoint = session.endpoint();

    endpoint.get("/clock").await.unwrap();
    let hit = endpoint.dispatch(RequestDescriptor::get("/clock")).await.unwrap();
    assert_eq!(hit.provenance(), Provenance::AppCache);
    assert_eq!(transport.calls(), 1);

    tokio::time::sleep(Duration::from_millis(80)).await;
    let refreshed = endpoint.dispatch(RequestDescriptor::get("/clock")).await.unwrap();
    assert_eq!(refreshed.provenance(), Provenance::Network);
    assert_eq!(&refreshed.body[..], b"v2");
    assert_eq!(session.cache().len(), 1);
}

#[tokio::test]
async fn test_long_url_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new();
    transport.push(Reply::ok("long"));
    let session = builder(&transport)
        .cache_store(disk(&dir))
        .default_expiry(CacheExpiry::Contingent)
        .build()
        .unwrap();
    let endpoint = session.endpoint();

    let path = format!("/search?q={}", "x".repeat(6000));
    endpoint.get(path.clone()).await.unwrap();
    assert_eq!(session.cache().len(), 1);

    transport.push(Reply::status(500));
    let fallback = endpoint.dispatch(RequestDescriptor::get(path)).await.unwrap();
    assert_eq!(fallback.provenance(), Provenance::AppCache);
    assert_eq!(&fallback.body[..], b"long");
}

#[tokio::test]
async fn test_clear_empties_the_directory() {
    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new();
    let session = builder(&transport)
        .cache_store(disk(&dir))
        .default_expiry(CacheExpiry::Never)
        .build()
        .unwrap();
    let endpoint = session.endpoint();
    endpoint.get("/a").await.unwrap();
    endpoint.get("/b").await.unwrap();
    assert_eq!(session.cache().len(), 2);

    session.cache().clear();
    assert!(session.cache().is_empty());
    assert!(dir.path().join("CACHEDIR.TAG").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disk_backed_session_on_multi_thread_runtime() {
    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new();
    transport.push(Reply::ok("mt"));
    let session = builder(&transport)
        .cache_store(disk(&dir))
        .default_expiry(CacheExpiry::Never)
        .build()
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let endpoint = session.endpoint();
            tokio::spawn(async move { endpoint.get("/shared").await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    let hit = session
        .endpoint()
        .dispatch(RequestDescriptor::get("/shared"))
        .await
        .unwrap();
    assert_eq!(hit.provenance(), Provenance::AppCache);
    assert_eq!(session.cache().len(), 1);
}
