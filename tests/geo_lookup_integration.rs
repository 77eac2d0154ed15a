//! Geolocation lookups against a local HTTP stand-in
//!
//! These tests exercise the real `IpInfoClient` over HTTP so that the
//! failure classification (timeout, bad body, transport errors) is checked
//! end-to-end through the resolver.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uriwatch::geo::{GeoLookup, GeoResolver, IpInfoClient, LookupError};

#[derive(Default)]
struct LookupCounter {
    calls: AtomicUsize,
}

async fn ipinfo(State(counter): State<Arc<LookupCounter>>, Path(ip): Path<String>) -> Response {
    counter.calls.fetch_add(1, Ordering::SeqCst);
    match ip.as_str() {
        "1.2.3.4" => Json(serde_json::json!({"ip": ip, "city": "Paris", "country": "FR"})).into_response(),
        "10.0.0.1" => {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Json(serde_json::json!({"city": "Late", "region": "Late"})).into_response()
        }
        "10.0.0.2" => StatusCode::BAD_GATEWAY.into_response(),
        "10.0.0.3" => "<html>rate limited</html>".into_response(),
        _ => Json(serde_json::json!({"ip": ip, "city": "Oslo", "region": "Oslo County"})).into_response(),
    }
}

/// Start the stand-in service and return its base URL
async fn start_ipinfo() -> (String, Arc<LookupCounter>) {
    let counter = Arc::new(LookupCounter::default());
    let app = Router::new()
        .route("/{ip}/json", get(ipinfo))
        .with_state(Arc::clone(&counter));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), counter)
}

fn resolver_for(base_url: &str, timeout: Duration) -> GeoResolver {
    let client = IpInfoClient::new(base_url, timeout).unwrap();
    GeoResolver::new(Arc::new(client))
}

#[tokio::test]
async fn test_lookup_parses_city_and_region() {
    let (base_url, _) = start_ipinfo().await;
    let client = IpInfoClient::new(&base_url, Duration::from_secs(5)).unwrap();

    let response = client.lookup("5.6.7.8").await.unwrap();
    assert_eq!(response.city.as_deref(), Some("Oslo"));
    assert_eq!(response.region.as_deref(), Some("Oslo County"));
}

#[tokio::test]
async fn test_placeholder_result_is_cached() {
    let (base_url, counter) = start_ipinfo().await;
    let resolver = resolver_for(&base_url, Duration::from_secs(5));

    assert_eq!(resolver.describe("1.2.3.4").await, "Paris, Error retrieving region");
    assert_eq!(resolver.describe("1.2.3.4").await, "Paris, Error retrieving region");
    assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_timeout_is_reported() {
    let (base_url, _) = start_ipinfo().await;
    let client = IpInfoClient::new(&base_url, Duration::from_millis(300)).unwrap();

    assert!(matches!(
        client.lookup("10.0.0.1").await,
        Err(LookupError::Timeout)
    ));

    let resolver = GeoResolver::new(Arc::new(client));
    assert_eq!(
        resolver.describe("10.0.0.1").await,
        "Connection timed out for ip 10.0.0.1"
    );
    assert!(!resolver.cache().contains("10.0.0.1"));
}

#[tokio::test]
async fn test_error_status_is_a_transport_error() {
    let (base_url, counter) = start_ipinfo().await;
    let resolver = resolver_for(&base_url, Duration::from_secs(5));

    let text = resolver.describe("10.0.0.2").await;
    assert!(text.starts_with("Client error: "), "got {text}");
    assert!(text.contains("502"), "got {text}");

    // Failures are not cached, so the next call goes out again
    resolver.describe("10.0.0.2").await;
    assert_eq!(counter.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_non_json_body_is_a_parse_error() {
    let (base_url, _) = start_ipinfo().await;
    let resolver = resolver_for(&base_url, Duration::from_secs(5));

    assert_eq!(
        resolver.describe("10.0.0.3").await,
        "Invalid parse format for ip 10.0.0.3"
    );
}

#[tokio::test]
async fn test_unreachable_service_is_a_transport_error() {
    // Grab a free port and close it again so nothing is listening there
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let resolver = resolver_for(&format!("http://{}", addr), Duration::from_secs(2));
    let text = resolver.describe("8.8.8.8").await;
    assert!(text.starts_with("Client error: "), "got {text}");
}
