//! Scan recorder integration tests
//!
//! These tests exercise the tracking endpoint end-to-end: the
//! redirect-vs-plain-text rule, the 404/410 terminal states, and the
//! trackable/untrackable recording behavior including counter atomicity
//! under concurrent requests.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    routing::get,
    Json, Router,
};
use qrtrack::analytics::GeoIpResolver;
use qrtrack::models::{NewQrCode, ScanEvent};
use qrtrack::storage::{SqliteStorage, Storage};
use qrtrack::track;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::{Layer, ServiceExt};

/// Helper to create test storage
async fn create_test_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

fn disabled_geoip() -> Arc<GeoIpResolver> {
    Arc::new(GeoIpResolver::new(None, Duration::from_secs(1)).unwrap())
}

/// Seed a user and one QR code, returning the QR id.
async fn seed_qr(storage: &Arc<dyn Storage>, text: &str, trackable: bool, active: bool) -> i64 {
    let user = match storage.get_user_by_email("owner@example.com").await.unwrap() {
        Some(user) => user,
        None => storage
            .create_user("owner@example.com", "not-a-real-hash")
            .await
            .unwrap(),
    };

    let qr = storage
        .create_qrcode(&NewQrCode {
            user_id: user.id,
            text: text.to_string(),
            trackable,
            active,
            error_correction: "M".to_string(),
            box_size: 10,
            border: 4,
            fill_color: "black".to_string(),
            back_color: "white".to_string(),
        })
        .await
        .unwrap();

    qr.id
}

async fn events_for(storage: &Arc<dyn Storage>, qr_id: i64) -> Vec<ScanEvent> {
    storage.scans_page(qr_id, None, 1000).await.unwrap()
}

/// Helper layer to inject ConnectInfo for tests
#[derive(Clone)]
struct TestConnectInfoLayer;

impl<S> Layer<S> for TestConnectInfoLayer {
    type Service = TestConnectInfoMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TestConnectInfoMiddleware { inner }
    }
}

#[derive(Clone)]
struct TestConnectInfoMiddleware<S> {
    inner: S,
}

impl<S, B> tower::Service<Request<B>> for TestConnectInfoMiddleware<S>
where
    S: tower::Service<Request<B>> + Clone,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        // Insert test ConnectInfo extension
        let addr = SocketAddr::from(([127, 0, 0, 1], 12345));
        req.extensions_mut()
            .insert(axum::extract::connect_info::ConnectInfo(addr));

        self.inner.call(req)
    }
}

fn test_app(storage: Arc<dyn Storage>, geoip: Arc<GeoIpResolver>) -> Router {
    track::create_track_router(storage, geoip).layer(TestConnectInfoLayer)
}

fn track_request(qr_id: i64) -> Request<Body> {
    Request::builder()
        .uri(format!("/track/{qr_id}"))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_track_redirects_for_url_text() {
    let storage = create_test_storage().await;
    let qr_id = seed_qr(&storage, "https://example.com/destination", true, true).await;
    let app = test_app(storage.clone(), disabled_geoip());

    let response = app.oneshot(track_request(qr_id)).await.unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = response.headers().get("location").unwrap();
    assert_eq!(location, "https://example.com/destination");
}

#[tokio::test]
async fn test_track_returns_plain_text_for_non_url() {
    let storage = create_test_storage().await;
    let qr_id = seed_qr(&storage, "hello", true, true).await;
    let app = test_app(storage.clone(), disabled_geoip());

    let response = app.oneshot(track_request(qr_id)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"hello");
}

#[tokio::test]
async fn test_http_prefix_check_is_case_insensitive() {
    let storage = create_test_storage().await;
    let qr_id = seed_qr(&storage, "HTTPS://EXAMPLE.COM/UPPER", true, true).await;
    let app = test_app(storage.clone(), disabled_geoip());

    let response = app.oneshot(track_request(qr_id)).await.unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
}

#[tokio::test]
async fn test_track_unknown_qr_is_not_found() {
    let storage = create_test_storage().await;
    let app = test_app(storage.clone(), disabled_geoip());

    let response = app.oneshot(track_request(9999)).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_track_inactive_qr_is_gone_and_records_nothing() {
    let storage = create_test_storage().await;
    let qr_id = seed_qr(&storage, "https://example.com", true, false).await;
    let app = test_app(storage.clone(), disabled_geoip());

    let response = app.oneshot(track_request(qr_id)).await.unwrap();

    assert_eq!(response.status(), StatusCode::GONE);
    let qr = storage.get_qrcode(qr_id).await.unwrap().unwrap();
    assert_eq!(qr.scans_count, 0);
    assert!(events_for(&storage, qr_id).await.is_empty());
}

#[tokio::test]
async fn test_untrackable_active_qr_returns_content_without_recording() {
    let storage = create_test_storage().await;
    let qr_id = seed_qr(&storage, "just some text", false, true).await;
    let app = test_app(storage.clone(), disabled_geoip());

    let response = app.oneshot(track_request(qr_id)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let qr = storage.get_qrcode(qr_id).await.unwrap().unwrap();
    assert_eq!(qr.scans_count, 0);
    assert!(events_for(&storage, qr_id).await.is_empty());
}

#[tokio::test]
async fn test_trackable_scan_records_event_and_increments_counter() {
    let storage = create_test_storage().await;
    let qr_id = seed_qr(&storage, "https://example.com", true, true).await;
    let app = test_app(storage.clone(), disabled_geoip());

    let request = Request::builder()
        .uri(format!("/track/{qr_id}"))
        .header("x-forwarded-for", "203.0.113.9, 198.51.100.1")
        .header(
            "user-agent",
            "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.0 Mobile/15E148 Safari/604.1",
        )
        .header("referer", "https://social.example/post/1")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let qr = storage.get_qrcode(qr_id).await.unwrap().unwrap();
    assert_eq!(qr.scans_count, 1);

    let events = events_for(&storage, qr_id).await;
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.ip.as_deref(), Some("203.0.113.9"));
    assert_eq!(event.device_type.as_deref(), Some("mobile"));
    assert!(event.browser.is_some());
    assert_eq!(
        event.referer.as_deref(),
        Some("https://social.example/post/1")
    );
    // No geolocation configured: location stays absent, scan still recorded
    assert!(event.country.is_none());
    assert!(event.city.is_none());
}

#[tokio::test]
async fn test_scan_without_user_agent_defaults_to_desktop() {
    let storage = create_test_storage().await;
    let qr_id = seed_qr(&storage, "hello", true, true).await;
    let app = test_app(storage.clone(), disabled_geoip());

    let response = app.oneshot(track_request(qr_id)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let events = events_for(&storage, qr_id).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].device_type.as_deref(), Some("desktop"));
    assert!(events[0].user_agent.is_none());
    assert!(events[0].os.is_none());
    assert!(events[0].browser.is_none());
}

#[tokio::test]
async fn test_unreachable_geolocation_never_fails_the_scan() {
    let storage = create_test_storage().await;
    let qr_id = seed_qr(&storage, "https://example.com", true, true).await;
    // Nothing listens on port 1; the lookup must fail open.
    let geoip = Arc::new(
        GeoIpResolver::new(
            Some("http://127.0.0.1:1/geo/{ip}".to_string()),
            Duration::from_millis(500),
        )
        .unwrap(),
    );
    let app = test_app(storage.clone(), geoip);

    let response = app.oneshot(track_request(qr_id)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let events = events_for(&storage, qr_id).await;
    assert_eq!(events.len(), 1);
    assert!(events[0].country.is_none());
    assert!(events[0].city.is_none());
}

#[tokio::test]
async fn test_geolocation_enrichment_from_stub_endpoint() {
    // Local stub standing in for the external lookup service
    let stub = Router::new().route(
        "/geo/{ip}",
        get(|| async {
            Json(serde_json::json!({
                "country_name": "Brazil",
                "city": "São Paulo"
            }))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let stub_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, stub).await.unwrap();
    });

    let storage = create_test_storage().await;
    let qr_id = seed_qr(&storage, "https://example.com", true, true).await;
    let geoip = Arc::new(
        GeoIpResolver::new(
            Some(format!("http://{stub_addr}/geo/{{ip}}")),
            Duration::from_secs(1),
        )
        .unwrap(),
    );
    let app = test_app(storage.clone(), geoip);

    let response = app.oneshot(track_request(qr_id)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let events = events_for(&storage, qr_id).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].country.as_deref(), Some("Brazil"));
    assert_eq!(events[0].city.as_deref(), Some("São Paulo"));
}

#[tokio::test]
async fn test_concurrent_scans_lose_no_updates() {
    // A shared on-disk database so every pooled connection sees the same
    // data; in-memory sqlite would give each connection its own database.
    let path = std::env::temp_dir().join(format!(
        "qrtrack_concurrency_{}_{}.db",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    let url = format!("sqlite://{}?mode=rwc", path.display());

    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::new(&url, 5).await.unwrap());
    storage.init().await.unwrap();

    let qr_id = seed_qr(&storage, "https://example.com", true, true).await;
    let app = test_app(storage.clone(), disabled_geoip());

    let mut handles = Vec::new();
    for _ in 0..100 {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            let response = app.oneshot(track_request(qr_id)).await.unwrap();
            assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let qr = storage.get_qrcode(qr_id).await.unwrap().unwrap();
    assert_eq!(qr.scans_count, 100, "no increment may be lost");
    assert_eq!(events_for(&storage, qr_id).await.len(), 100);

    let _ = std::fs::remove_file(&path);
}
