//! Axum request handlers for the HTTP API.
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::api::routes::AppState;
use crate::error::GenerationError;
use crate::request::RunEnvelope;
use crate::response::GenerationResponse;

pub async fn root() -> &'static str {
    "Wan image-to-video proxy"
}

pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    match state.engine.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "ok"}))),
        Err(e) => {
            tracing::warn!(error = %e, "Health check: engine unreachable");
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"status": "engine unavailable"})))
        }
    }
}

pub async fn run(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RunEnvelope>, JsonRejection>,
) -> (StatusCode, Json<GenerationResponse>) {
    let envelope = match payload {
        Ok(Json(envelope)) => envelope,
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "Rejected malformed request");
            let error = format!("invalid request: {}", rejection.body_text());
            return (StatusCode::BAD_REQUEST, Json(GenerationResponse::Error { error }));
        }
    };

    let outcome = state.pipeline.run(envelope.input).await;
    let status = outcome.error.as_ref().map_or(StatusCode::OK, status_for);
    (status, Json(outcome.response))
}

pub fn status_for(err: &GenerationError) -> StatusCode {
    match err {
        GenerationError::Input(_) | GenerationError::Template(_) => StatusCode::BAD_REQUEST,
        e if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
        GenerationError::Job(_) | GenerationError::Artifact(_) => StatusCode::BAD_GATEWAY,
    }
}
