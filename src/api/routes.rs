//! Router setup shared by the server binary and the API tests.
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::api::handlers;
use crate::generation::Orchestrator;

pub struct AppState {
    pub orchestrator: Orchestrator,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Arc<Self> {
        Arc::new(AppState { orchestrator })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::stats))
        .route("/enhance-prompt", post(handlers::enhance_prompt))
        .route("/generate-image", post(handlers::generate_image))
        .route("/generate-video", post(handlers::generate_video))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
