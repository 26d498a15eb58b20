//! Client-facing HTTP surface: the OpenAI-compatible `/v1` endpoints plus
//! health, metrics and the HTML status page.

mod auth;
mod handlers;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use aar_core::Engine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub master_key: Arc<str>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, master_key: impl Into<Arc<str>>) -> Self {
        Self {
            engine,
            master_key: master_key.into(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/embeddings", post(handlers::embeddings))
        .route("/v1/images/generations", post(handlers::image_generations))
        .route("/v1/models", get(handlers::list_models))
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_master_key));

    Router::new()
        .merge(api)
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/vhealth", get(handlers::vhealth))
        .with_state(state)
}
