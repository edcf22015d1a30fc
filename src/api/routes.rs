//! Router and shared state for the HTTP API.
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::handlers;
use crate::engine::ExecutionEngine;
use crate::pipeline::Pipeline;

pub struct AppState {
    pub pipeline: Pipeline,
    pub engine: Arc<dyn ExecutionEngine>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/run", post(handlers::run))
        .route("/runsync", post(handlers::run))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
