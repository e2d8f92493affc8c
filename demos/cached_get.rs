//! Cached GET example
//!
//! Fetches the same URL twice under a one-hour custom expiry. The first call
//! goes to the network, the second is answered from the in-memory cache.
//! A third call with a throttle of one request per second is rejected.
//!
//! Usage:
//!   RUST_LOG=reqcache=debug cargo run --example cached_get -- https://httpbin.org

use reqcache::{CacheExpiry, RequestDescriptor, Session, Throttle};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let base = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://httpbin.org".to_string());

    let session = Session::builder()
        .base_url(base)
        .default_expiry(CacheExpiry::Custom(Duration::from_secs(3600)))
        .build()?;
    let endpoint = session.endpoint();

    for attempt in 1..=2 {
        let response = endpoint.dispatch(RequestDescriptor::get("/get")).await?;
        println!(
            "attempt {attempt}: status {} from {} ({} bytes)",
            response.status,
            response.provenance(),
            response.body.len()
        );
    }

    endpoint.set_throttle(Some(Throttle::per_second(1)));
    for attempt in 1..=3 {
        match endpoint.dispatch(RequestDescriptor::get("/uuid")).await {
            Ok(response) => println!("throttled endpoint {attempt}: {}", response.text()?),
            Err(e) if e.is_throttled() => println!("throttled endpoint {attempt}: rejected"),
            Err(e) => return Err(e.into()),
        }
    }

    println!("\n{:#?}", session.signals());
    Ok(())
}
