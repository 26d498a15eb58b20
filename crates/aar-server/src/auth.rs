use axum::body::Body;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;

use aar_common::GatewayError;

use crate::handlers::error_response;
use crate::AppState;

pub async fn require_master_key(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !authorized(request.headers(), &state.master_key) {
        state
            .engine
            .metrics()
            .errors
            .with_label_values(&["invalid_auth"])
            .inc();
        return error_response(&GatewayError::InvalidAuth);
    }
    next.run(request).await
}

fn authorized(headers: &HeaderMap, master_key: &str) -> bool {
    let Some(value) = headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok()) else {
        return false;
    };
    let Some(token) = value.strip_prefix("Bearer ") else {
        return false;
    };
    !token.is_empty() && token == master_key
}
