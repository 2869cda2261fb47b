use crate::capture::{CaptureContext, CaptureService};
use crate::constants::{
    DATE_HEADER, IDEMPOTENCY_KEY_HEADER, ORG_ID_HEADER, REPLAYED_HEADER, REQUEST_ID_HEADER,
    SIGNATURE_HEADER,
};
use crate::error::AppError;
use crate::idempotency::{is_valid_idempotency_key, is_valid_org_id, payload_fingerprint};
use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use hyper::Server;
use serde_json::Value;
use std::net::SocketAddr;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub capture: CaptureService,
    pub metrics_enabled: bool,
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "passport-capture",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn metrics_handler() -> Response {
    match crate::metrics::render() {
        Some(text) => (StatusCode::OK, text).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn request_id_from(headers: &HeaderMap) -> String {
    header_str(headers, REQUEST_ID_HEADER)
        .filter(|id| id.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// The batch is either the `events` field of an object body or a bare array.
fn events_from_body(body: &Value) -> Option<&Value> {
    match body {
        Value::Object(map) => map.get("events"),
        other => Some(other),
    }
}

async fn capture_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let org_id = header_str(&headers, ORG_ID_HEADER)
        .filter(|id| is_valid_org_id(id))
        .ok_or(AppError::BadHeader("X-Org-Id"))?;
    let idempotency_key = header_str(&headers, IDEMPOTENCY_KEY_HEADER)
        .filter(|key| is_valid_idempotency_key(key))
        .ok_or(AppError::BadHeader("Idempotency-Key"))?;
    let request_id = request_id_from(&headers);

    // TODO: verify X-Signature once the HMAC scheme and key distribution are decided
    debug!(
        request_id = %request_id,
        signed = header_str(&headers, SIGNATURE_HEADER).is_some(),
        dated = header_str(&headers, DATE_HEADER).is_some(),
        "Capture request headers received"
    );

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::MalformedPayload(e.to_string()))?;

    let ctx = CaptureContext {
        org_id: org_id.to_string(),
        idempotency_key: idempotency_key.to_string(),
        request_id,
    };
    let outcome = state
        .capture
        .handle(
            events_from_body(&payload),
            &ctx,
            Some(payload_fingerprint(&body)),
        )
        .await?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
        response_headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    if outcome.is_replay() {
        response_headers.insert(
            HeaderName::from_static(REPLAYED_HEADER),
            HeaderValue::from_static("true"),
        );
    }

    Ok((StatusCode::OK, response_headers, outcome.body().to_string()).into_response())
}

/// Build the HTTP router for the capture service
pub fn create_server(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/health", get(health))
        .route("/capture", post(capture_handler));
    if state.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .layer(ServiceBuilder::new().layer(cors))
        .with_state(state)
}

/// Serve until Ctrl-C or SIGTERM
pub async fn start_server(state: AppState, port: u16) -> Result<(), hyper::Error> {
    let app = create_server(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("Capture server running on http://{addr}");

    Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!("Failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
