//! HTTP API
//!
//! - [`health`] - liveness and component checks
//! - [`submissions`] - intake and guestbook reads
//!
//! Everything else is served from the public directory.

pub mod health;
pub mod submissions;

use axum::{Router, middleware};
use http::{HeaderName, HeaderValue};
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::core::ServerState;

static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Random v4 request ids
#[derive(Clone)]
struct XRequestId;

impl MakeRequestId for XRequestId {
    fn make_request_id<B>(&mut self, _request: &http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// HTTP access log middleware
async fn log_request(
    request: http::Request<axum::body::Body>,
    next: middleware::Next,
) -> http::Response<axum::body::Body> {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let response = next.run(request).await;

    tracing::info!(
        target: "http_access",
        request_id = %request_id,
        "{} {} {}",
        method,
        uri,
        response.status()
    );
    response
}

/// Build the application router with state and middleware applied
pub fn build_app(state: ServerState) -> Router {
    let public = ServeDir::new(&state.config.public_dir);
    let body_limit = state.config.body_limit();

    Router::<ServerState>::new()
        .merge(health::router())
        .merge(submissions::router(body_limit))
        .fallback_service(public)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(log_request))
        .layer(TraceLayer::new_for_http())
        // Set runs first so the access log and the response both see the id
        .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER.clone()))
        .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER.clone(), XRequestId))
}
