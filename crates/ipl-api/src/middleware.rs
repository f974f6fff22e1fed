//! Router layers
use axum::{body::Body, http::Request, middleware::Next, response::Response};
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn cors() -> CorsLayer {
    CorsLayer::permissive()
}

pub fn trace() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
}

/// Log every response that is not a success with its path and status
pub async fn log_failures(req: Request<Body>, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let response = next.run(req).await;
    let status = response.status();
    if status.is_server_error() {
        tracing::error!(path = %path, status = status.as_u16(), "request failed");
    } else if status.is_client_error() {
        tracing::warn!(path = %path, status = status.as_u16(), "request rejected");
    }
    response
}
