mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::service_with;
use passport_capture::capture::StubIngestor;
use passport_capture::idempotency::lock_key;
use passport_capture::server::{create_server, AppState};
use passport_capture::store::{InMemoryStore, KeyValueStore};
use passport_capture::validator::EpcisEventValidator;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app_with_store(store: Arc<InMemoryStore>) -> Router {
    let capture = service_with(store, Arc::new(EpcisEventValidator), Arc::new(StubIngestor));
    create_server(AppState {
        capture,
        metrics_enabled: false,
    })
}

fn capture_request(org_id: Option<&str>, key: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/capture")
        .header("content-type", "application/json")
        .header("x-request-id", "req-1");
    if let Some(org_id) = org_id {
        builder = builder.header("x-org-id", org_id);
    }
    if let Some(key) = key {
        builder = builder.header("idempotency-key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    hyper::body::to_bytes(response.into_body())
        .await
        .unwrap()
        .to_vec()
}

const ONE_EVENT: &str = r#"{"events":[{"type":"ObjectEvent","eventTime":"2024-03-01T10:00:00Z"}]}"#;

#[tokio::test]
async fn accepted_capture_returns_result() {
    let app = app_with_store(Arc::new(InMemoryStore::new()));

    let response = app
        .oneshot(capture_request(Some("org-1"), Some("abc123"), ONE_EVENT))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "req-1");
    assert!(response.headers().get("idempotent-replayed").is_none());
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(
        body,
        json!({"accepted": true, "ingestedCount": 1, "ids": ["event-req-1-0"]})
    );
}

#[tokio::test]
async fn bare_array_body_is_accepted() {
    let app = app_with_store(Arc::new(InMemoryStore::new()));

    let response = app
        .oneshot(capture_request(
            Some("org-1"),
            Some("abc123"),
            r#"[{"type":"ObjectEvent"},{"type":"TransformationEvent"}]"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["ingestedCount"], 2);
}

#[tokio::test]
async fn retry_is_replayed_byte_for_byte() {
    let app = app_with_store(Arc::new(InMemoryStore::new()));

    let first = app
        .clone()
        .oneshot(capture_request(Some("org-1"), Some("abc123"), ONE_EVENT))
        .await
        .unwrap();
    let first_body = body_bytes(first).await;

    let second = app
        .oneshot(capture_request(Some("org-1"), Some("abc123"), ONE_EVENT))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers()["idempotent-replayed"], "true");
    assert_eq!(body_bytes(second).await, first_body);
}

#[tokio::test]
async fn missing_headers_are_rejected() {
    let app = app_with_store(Arc::new(InMemoryStore::new()));

    for (org_id, key) in [
        (None, Some("abc123")),
        (Some("org-1"), None),
        (Some("org:1"), Some("abc123")),
        (Some("org-1"), Some("has spaces")),
    ] {
        let response = app
            .clone()
            .oneshot(capture_request(org_id, key, ONE_EVENT))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{org_id:?} {key:?}");
        let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["error"], "client");
    }
}

#[tokio::test]
async fn malformed_json_is_rejected() {
    let app = app_with_store(Arc::new(InMemoryStore::new()));

    let response = app
        .oneshot(capture_request(Some("org-1"), Some("abc123"), "{not json"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn invalid_events_list_every_error() {
    let store = Arc::new(InMemoryStore::new());
    let app = app_with_store(store.clone());

    let response = app
        .oneshot(capture_request(
            Some("org-1"),
            Some("abc123"),
            r#"{"events":[{"bad":"event"},{"type":"MysteryEvent"}]}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["error"], "client");
    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 2);
    assert!(errors[0].as_str().unwrap().contains("missing type"));
    assert!(!store.exists(&lock_key("org-1", "abc123")).await.unwrap());
}

#[tokio::test]
async fn empty_events_are_rejected() {
    let app = app_with_store(Arc::new(InMemoryStore::new()));

    let response = app
        .oneshot(capture_request(Some("org-1"), Some("abc123"), r#"{"events":[]}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn in_flight_key_returns_conflict() {
    let store = Arc::new(InMemoryStore::new());
    store
        .set_if_not_exists(&lock_key("org-1", "abc123"), "1")
        .await
        .unwrap();
    let app = app_with_store(store);

    let response = app
        .oneshot(capture_request(Some("org-1"), Some("abc123"), ONE_EVENT))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn health_reports_service() {
    let app = app_with_store(Arc::new(InMemoryStore::new()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn metrics_route_absent_when_disabled() {
    let app = app_with_store(Arc::new(InMemoryStore::new()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
