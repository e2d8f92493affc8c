//! Expiry policies observed through full request cycles.

mod common;

use common::{builder, seed, session, stored, Reply, ScriptedTransport};
use reqcache::{CacheExpiry, CachePolicy, DispatchOptions, Error, Provenance, RequestDescriptor};
use std::time::Duration;

const FP: &str = "api.example.com/items";

fn items() -> RequestDescriptor {
    RequestDescriptor::get("/items")
}

#[tokio::test]
async fn test_custom_entry_within_ttl_is_served_without_network() {
    let transport = ScriptedTransport::new();
    let session = builder(&transport)
        .default_expiry(CacheExpiry::Custom(Duration::from_secs(60)))
        .build()
        .unwrap();
    seed(&session, FP, "cached", Duration::from_secs(10));

    let response = session.endpoint().dispatch(items()).await.unwrap();
    assert_eq!(response.provenance(), Provenance::AppCache);
    assert_eq!(&response.body[..], b"cached");
    assert!(response.cached_at.is_some());
    assert!(response.task.id().is_none());
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_custom_entry_past_ttl_is_removed_after_successful_refresh() {
    let transport = ScriptedTransport::new();
    transport.push(Reply::ok("a fresh body that is too large to cache"));
    let session = builder(&transport)
        .default_expiry(CacheExpiry::Custom(Duration::from_secs(60)))
        .max_cache_entry_size(8)
        .build()
        .unwrap();
    seed(&session, FP, "old", Duration::from_secs(120));
    assert_eq!(session.cache().len(), 1);

    let response = session.endpoint().dispatch(items()).await.unwrap();
    assert_eq!(response.provenance(), Provenance::Network);
    assert_eq!(transport.calls(), 1);

    // stale entry removed, fresh body skipped: 1 -> 0
    assert_eq!(session.cache().len(), 0);
    let stats = session.cache_stats();
    assert_eq!(stats.removals, 1);
    assert_eq!(stats.skipped_writes, 1);
}

#[tokio::test]
async fn test_custom_entry_past_ttl_is_replaced_by_fresh_write() {
    let transport = ScriptedTransport::new();
    transport.push(Reply::ok("fresh"));
    let session = builder(&transport)
        .default_expiry(CacheExpiry::Custom(Duration::from_secs(60)))
        .build()
        .unwrap();
    seed(&session, FP, "old", Duration::from_secs(120));

    session.endpoint().dispatch(items()).await.unwrap();
    let entry = stored(&session, FP).unwrap();
    assert_eq!(&entry.body[..], b"fresh");
    assert!(entry.age() < Duration::from_secs(60));
}

#[tokio::test]
async fn test_custom_entry_past_ttl_is_not_a_fallback() {
    let transport = ScriptedTransport::new();
    transport.push(Reply::status(503));
    let session = builder(&transport)
        .default_expiry(CacheExpiry::Custom(Duration::from_secs(60)))
        .build()
        .unwrap();
    seed(&session, FP, "old", Duration::from_secs(120));

    let err = session.endpoint().dispatch(items()).await.unwrap_err();
    assert_eq!(err.status(), Some(503));
    // a failed attempt does not trigger removal
    assert_eq!(session.cache().len(), 1);
}

#[tokio::test]
async fn test_contingent_entry_is_served_only_when_request_fails() {
    let transport = ScriptedTransport::new();
    transport.push(Reply::status(500));
    let session = builder(&transport)
        .default_expiry(CacheExpiry::Contingent)
        .build()
        .unwrap();
    seed(&session, FP, "stale", Duration::from_secs(86_400));

    let response = session.endpoint().dispatch(items()).await.unwrap();
    assert_eq!(transport.calls(), 1);
    assert_eq!(response.provenance(), Provenance::AppCache);
    assert_eq!(response.status, 200);
    assert_eq!(&response.body[..], b"stale");
    assert!(response.task.id().is_some());
    assert_eq!(session.cache().len(), 1);
    assert_eq!(session.cache_stats().fallbacks, 1);
}

#[tokio::test]
async fn test_contingent_entry_covers_transport_failures() {
    let transport = ScriptedTransport::new();
    transport.push(Reply::Fail);
    let session = builder(&transport)
        .default_expiry(CacheExpiry::Contingent)
        .build()
        .unwrap();
    seed(&session, FP, "stale", Duration::from_secs(5));

    let response = session.endpoint().dispatch(items()).await.unwrap();
    assert_eq!(response.provenance(), Provenance::AppCache);
}

#[tokio::test]
async fn test_contingent_entry_is_overwritten_not_removed_on_success() {
    let transport = ScriptedTransport::new();
    transport.push(Reply::ok("fresh"));
    let session = builder(&transport)
        .default_expiry(CacheExpiry::Contingent)
        .build()
        .unwrap();
    seed(&session, FP, "stale", Duration::from_secs(86_400));

    let response = session.endpoint().dispatch(items()).await.unwrap();
    assert_eq!(response.provenance(), Provenance::Network);
    assert_eq!(session.cache().len(), 1);
    assert_eq!(&stored(&session, FP).unwrap().body[..], b"fresh");
    assert_eq!(session.cache_stats().removals, 0);
}

#[tokio::test]
async fn test_always_leaves_store_empty() {
    let transport = ScriptedTransport::new();
    let session = builder(&transport)
        .default_expiry(CacheExpiry::Always)
        .build()
        .unwrap();
    seed(&session, FP, "old", Duration::ZERO);

    let response = session.endpoint().dispatch(items()).await.unwrap();
    assert_eq!(response.provenance(), Provenance::Network);
    assert_eq!(transport.calls(), 1);
    assert_eq!(session.cache().len(), 0);

    session.endpoint().dispatch(items()).await.unwrap();
    assert_eq!(transport.calls(), 2);
    assert_eq!(session.cache().len(), 0);
}

#[tokio::test]
async fn test_negative_custom_ttl_is_expired_but_still_written() {
    let transport = ScriptedTransport::new();
    transport.push(Reply::ok("fresh"));
    let session = builder(&transport)
        .default_expiry(CacheExpiry::custom_secs(-1))
        .build()
        .unwrap();
    seed(&session, FP, "old", Duration::ZERO);

    let response = session.endpoint().dispatch(items()).await.unwrap();
    assert_eq!(response.provenance(), Provenance::Network);
    assert_eq!(transport.calls(), 1);
    assert_eq!(session.cache().len(), 1);
    assert_eq!(stored(&session, FP).unwrap().body.as_ref(), b"fresh");

    // a fresh entry is still expired, and never a fallback
    transport.push(Reply::status(500));
    let err = session.endpoint().dispatch(items()).await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_contingent_after_fresh_entry_is_served() {
    let transport = ScriptedTransport::new();
    let session = builder(&transport)
        .default_expiry(CacheExpiry::ContingentAfter(Duration::from_secs(60)))
        .build()
        .unwrap();
    seed(&session, FP, "cached", Duration::from_secs(30));

    let response = session.endpoint().dispatch(items()).await.unwrap();
    assert_eq!(response.provenance(), Provenance::AppCache);
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_contingent_after_expired_entry_is_overwritten_on_success() {
    let transport = ScriptedTransport::new();
    transport.push(Reply::ok("fresh"));
    let session = builder(&transport)
        .default_expiry(CacheExpiry::ContingentAfter(Duration::from_secs(60)))
        .build()
        .unwrap();
    seed(&session, FP, "old", Duration::from_secs(120));

    let response = session.endpoint().dispatch(items()).await.unwrap();
    assert_eq!(response.provenance(), Provenance::Network);

    // never removed for age, but the fresh write replaces it
    let entry = stored(&session, FP).unwrap();
    assert_eq!(&entry.body[..], b"fresh");
    assert!(entry.age() < Duration::from_secs(60));
    assert_eq!(session.cache_stats().removals, 0);

    // and it is now fresh again
    let again = session.endpoint().dispatch(items()).await.unwrap();
    assert_eq!(again.provenance(), Provenance::AppCache);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_contingent_after_expired_entry_is_a_fallback() {
    let transport = ScriptedTransport::new();
    transport.push(Reply::status(502));
    let session = builder(&transport)
        .default_expiry(CacheExpiry::ContingentAfter(Duration::from_secs(60)))
        .build()
        .unwrap();
    seed(&session, FP, "old", Duration::from_secs(120));

    let response = session.endpoint().dispatch(items()).await.unwrap();
    assert_eq!(response.provenance(), Provenance::AppCache);
    assert_eq!(&response.body[..], b"old");
    assert_eq!(session.cache().len(), 1);
}

#[tokio::test]
async fn test_ignore_policy_never_reads_cache_but_still_writes() {
    let transport = ScriptedTransport::new();
    transport.push(Reply::ok("fresh")).push(Reply::status(500));
    let session = session(&transport);
    seed(&session, FP, "cached", Duration::ZERO);

    let endpoint = session.endpoint();
    endpoint.set_cache_policy(CachePolicy::Ignore);

    let response = endpoint.dispatch(items()).await.unwrap();
    assert_eq!(response.provenance(), Provenance::Network);
    assert_eq!(&stored(&session, FP).unwrap().body[..], b"fresh");

    // no fallback either
    let err = endpoint.dispatch(items()).await.unwrap_err();
    assert!(matches!(err, Error::HttpStatus { status: 500, .. }));
}

#[tokio::test]
async fn test_only_get_responses_are_cached() {
    let transport = ScriptedTransport::new();
    let session = session(&transport);
    let endpoint = session.endpoint();

    endpoint
        .dispatch(RequestDescriptor::post("/items").with_body("{}"))
        .await
        .unwrap();
    assert_eq!(session.cache().len(), 0);

    endpoint.dispatch(items()).await.unwrap();
    assert_eq!(session.cache().len(), 1);
}

#[tokio::test]
async fn test_error_responses_are_not_cached() {
    let transport = ScriptedTransport::new();
    transport.push(Reply::status(404));
    let session = session(&transport);

    let err = session.endpoint().dispatch(items()).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(session.cache().len(), 0);
}

#[tokio::test]
async fn test_expiry_override_and_dispatch_options() {
    let transport = ScriptedTransport::new();
    let session = builder(&transport)
        .expiry_override(|req| {
            req.url()
                .starts_with("/live")
                .then_some(CacheExpiry::Always)
        })
        .build()
        .unwrap();
    let endpoint = session.endpoint();

    endpoint.dispatch(RequestDescriptor::get("/live")).await.unwrap();
    endpoint.dispatch(RequestDescriptor::get("/live")).await.unwrap();
    assert_eq!(transport.calls(), 2);

    // default policy (Never) caches
    endpoint.dispatch(items()).await.unwrap();
    endpoint.dispatch(items()).await.unwrap();
    assert_eq!(transport.calls(), 3);

    // per-dispatch override beats both
    let response = endpoint
        .dispatch_with(items(), DispatchOptions::new().with_expiry(CacheExpiry::Always))
        .await
        .unwrap();
    assert_eq!(response.provenance(), Provenance::Network);
    assert_eq!(transport.calls(), 4);
}

#[tokio::test]
async fn test_query_can_be_left_out_of_fingerprint() {
    let transport = ScriptedTransport::new();
    let session = builder(&transport)
        .query_in_fingerprint(|req| !req.url().starts_with("/search"))
        .build()
        .unwrap();
    let endpoint = session.endpoint();

    endpoint
        .dispatch(RequestDescriptor::get("/search?q=a"))
        .await
        .unwrap();
    let second = endpoint
        .dispatch(RequestDescriptor::get("/search?q=b"))
        .await
        .unwrap();
    assert_eq!(second.provenance(), Provenance::AppCache);

    endpoint
        .dispatch(RequestDescriptor::get("/items?page=1"))
        .await
        .unwrap();
    let other_page = endpoint
        .dispatch(RequestDescriptor::get("/items?page=2"))
        .await
        .unwrap();
    assert_eq!(other_page.provenance(), Provenance::Network);
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn test_disabled_cache_goes_to_network_every_time() {
    let transport = ScriptedTransport::new();
    let session = builder(&transport).caching(false).build().unwrap();
    let endpoint = session.endpoint();
    endpoint.dispatch(items()).await.unwrap();
    endpoint.dispatch(items()).await.unwrap();
    assert_eq!(transport.calls(), 2);
    assert_eq!(session.cache().len(), 0);
}
