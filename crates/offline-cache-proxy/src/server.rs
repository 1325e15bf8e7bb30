//! HTTP server that routes every request through the offline cache
//!
//! `/__offline/health` reports controller state; every other request is
//! handed to the lifecycle controller and either answered from its
//! resolution or forwarded to the origin untouched.

use crate::types::HealthResponse;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use offline_cache::{FetchOutcome, LifecycleController, Request, Resolution};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use url::Url;

/// Headers that describe one connection and must not be forwarded
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// Shared state for the HTTP server
pub struct ServerState {
    pub controller: LifecycleController,
    /// Client for pass-through traffic
    pub upstream: reqwest::Client,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(controller: LifecycleController, upstream: reqwest::Client) -> Self {
        Self {
            controller,
            upstream,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/__offline/health", get(health))
        .fallback(intercept)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds() as u64;
    let partitions = match state.controller.manager().list_partitions().await {
        Ok(names) => names,
        Err(e) => {
            warn!(error = %e, "Failed to list partitions");
            Vec::new()
        }
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        state: state.controller.state(),
        uptime_secs,
        partitions,
        cache: state.controller.stats(),
    })
}

/// Absolute target of a request: proxy-style absolute URIs are used as-is,
/// origin-form paths are resolved against the configured origin
fn target_url(origin: &Url, uri: &Uri) -> Result<Url, url::ParseError> {
    if uri.scheme().is_some() {
        return Url::parse(&uri.to_string());
    }
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    origin.join(path)
}

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

fn forwardable(headers: &HeaderMap) -> HeaderMap {
    headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Every request other than the health check
async fn intercept(
    State(state): State<SharedState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let url = match target_url(&state.controller.config().origin, &uri) {
        Ok(url) => url,
        Err(e) => {
            warn!(uri = %uri, error = %e, "Unroutable request");
            return error_response(StatusCode::BAD_REQUEST, "Invalid request URL");
        }
    };

    let mut request = Request::new(method.clone(), url.clone());
    for (name, value) in headers.iter() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            request = request.with_header(name.as_str(), value);
        }
    }

    match state.controller.handle_fetch(&request).await {
        FetchOutcome::Respond(resolution) => into_http_response(resolution),
        FetchOutcome::Passthrough => forward(&state, method, url, &headers, body).await,
    }
}

fn into_http_response(resolution: Resolution) -> Response {
    let Resolution { response, source } = resolution;

    let mut http = Response::new(Body::from(response.body));
    *http.status_mut() = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);

    let headers = http.headers_mut();
    for (name, value) in &response.headers {
        if is_hop_by_hop(name) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
    headers.insert(
        HeaderName::from_static("x-cache"),
        HeaderValue::from_static(source.as_header_value()),
    );
    http
}

/// Send a request to the network untouched by the cache
async fn forward(
    state: &ServerState,
    method: Method,
    url: Url,
    headers: &HeaderMap,
    body: Bytes,
) -> Response {
    let upstream = state
        .upstream
        .request(method.clone(), url.clone())
        .headers(forwardable(headers))
        .body(body)
        .send()
        .await;

    let upstream = match upstream {
        Ok(upstream) => upstream,
        Err(e) => {
            warn!(method = %method, url = %url, error = %e, "Pass-through request failed");
            return error_response(StatusCode::BAD_GATEWAY, "Upstream unavailable");
        }
    };

    let status = upstream.status();
    let upstream_headers = forwardable(upstream.headers());
    match upstream.bytes().await {
        Ok(bytes) => {
            let mut http = Response::new(Body::from(bytes));
            *http.status_mut() = status;
            *http.headers_mut() = upstream_headers;
            http
        }
        Err(e) => {
            warn!(method = %method, url = %url, error = %e, "Failed to read upstream body");
            error_response(StatusCode::BAD_GATEWAY, "Upstream unavailable")
        }
    }
}
