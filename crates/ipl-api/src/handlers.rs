//! API Handlers
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use ipl_core::{ActionRequest, IPL_VERSION};
use ipl_pipeline::{Action, Executor};
use ipl_platform::ProgressUpdate;
use serde_json::{json, Value};

use crate::AppState;

/// App manifest the platform reads to discover actions and params
pub const MANIFEST: &str = include_str!("../assets/manifest.json");

/// `POST /execute`: 200 with the completion payload, 400 with the joined
/// warnings, 500 with the error text of a structural failure.
pub async fn execute(State(state): State<AppState>, body: Bytes) -> Response {
    let request = match ActionRequest::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::error!(error = %e, "failed to execute");
            state.metrics.observe_invalid_request();
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };

    tracing::info!(
        execution_id = %request.execution_id,
        action = %request.action_name,
        "execution started"
    );

    let platform = state.platforms.for_request(&request);
    let executor = Executor::new(platform.as_ref(), state.connector.as_ref())
        .with_max_warnings(state.config.max_warnings);

    match executor.execute(&request).await {
        Ok(outcome) => {
            state.metrics.observe(&outcome);
            if outcome.is_success() {
                (StatusCode::OK, Json(ProgressUpdate::completed(&request.execution_id))).into_response()
            } else {
                (StatusCode::BAD_REQUEST, outcome.message()).into_response()
            }
        }
        Err(e) => {
            tracing::error!(execution_id = %request.execution_id, error = %e, "failed to execute");
            state.metrics.observe_error(&Action::parse(&request.action_name));
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

pub async fn manifest() -> impl IntoResponse {
    tracing::debug!(len = MANIFEST.len(), "return manifest");
    ([(header::CONTENT_TYPE, "application/json")], MANIFEST)
}

pub async fn health() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "ok", "version": IPL_VERSION })))
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.encode() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
