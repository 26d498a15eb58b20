use std::convert::Infallible;

use axum::body::Body;
use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use futures_util::StreamExt;
use serde::Serialize;
use tokio_stream::wrappers::ReceiverStream;

use aar_common::GatewayError;
use aar_protocol::openai::chat::request::ChatCompletionRequest;
use aar_protocol::openai::embeddings::EmbeddingsRequest;
use aar_protocol::openai::images::ImageGenerationRequest;
use aar_protocol::openai::models::{Model, ModelList, ModelListObjectType, ModelObjectType};

use crate::AppState;

pub fn error_response(err: &GatewayError) -> Response {
    let status =
        StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err.body())).into_response()
}

fn fail(state: &AppState, err: GatewayError) -> Response {
    state
        .engine
        .metrics()
        .errors
        .with_label_values(&[error_kind(&err)])
        .inc();
    if matches!(&err, GatewayError::Internal(_)) {
        tracing::error!(error = %err, "request failed with internal error");
    }
    error_response(&err)
}

fn error_kind(err: &GatewayError) -> &'static str {
    match err {
        GatewayError::InvalidAuth => "invalid_auth",
        GatewayError::UnknownModel(_) => "unknown_model",
        GatewayError::NoEligibleCredential(_) => "no_credentials",
        GatewayError::UpstreamTransient { .. } => "upstream_transient",
        GatewayError::UpstreamPermanent { .. } => "upstream_permanent",
        GatewayError::Adapter(_) => "adapter",
        GatewayError::Timeout => "timeout",
        GatewayError::Internal(_) => "internal",
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, GatewayError> {
    serde_json::from_slice(body)
        .map_err(|err| GatewayError::Adapter(format!("invalid request body: {err}")))
}

pub async fn chat_completions(State(state): State<AppState>, body: Bytes) -> Response {
    let request: ChatCompletionRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(err) => return fail(&state, err),
    };
    if request.messages.is_empty() {
        return fail(
            &state,
            GatewayError::Adapter("`messages` must not be empty".to_string()),
        );
    }

    if request.is_stream() {
        match state.engine.chat_stream(request).await {
            Ok(stream) => {
                let body = Body::from_stream(
                    ReceiverStream::new(stream.receiver).map(Ok::<_, Infallible>),
                );
                Response::builder()
                    .header(CONTENT_TYPE, "text/event-stream")
                    .header(CACHE_CONTROL, "no-cache")
                    .body(body)
                    .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
            }
            Err(err) => fail(&state, err),
        }
    } else {
        match state.engine.chat(request).await {
            Ok(response) => Json(response).into_response(),
            Err(err) => fail(&state, err),
        }
    }
}

pub async fn embeddings(State(state): State<AppState>, body: Bytes) -> Response {
    let request: EmbeddingsRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(err) => return fail(&state, err),
    };
    match state.engine.embeddings(request).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => fail(&state, err),
    }
}

pub async fn image_generations(State(state): State<AppState>, body: Bytes) -> Response {
    let request: ImageGenerationRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(err) => return fail(&state, err),
    };
    match state.engine.images(request).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => fail(&state, err),
    }
}

pub async fn list_models(State(state): State<AppState>) -> Response {
    let created = time::OffsetDateTime::now_utc().unix_timestamp();
    let data = state
        .engine
        .models()
        .aliases()
        .map(|(alias, binding)| Model {
            id: alias.to_string(),
            object: ModelObjectType::Model,
            created,
            owned_by: binding.provider.as_str().to_string(),
        })
        .collect();
    Json(ModelList {
        object: ModelListObjectType::List,
        data,
    })
    .into_response()
}

#[derive(Debug, Serialize)]
struct HealthPayload {
    status: &'static str,
    credentials_available: usize,
    total_credentials: usize,
    credentials_banned: usize,
}

pub async fn health(State(state): State<AppState>) -> Response {
    let snapshot = state.engine.pool().snapshot().await;
    let healthy = snapshot.available > 0;
    let payload = HealthPayload {
        status: if healthy { "healthy" } else { "unhealthy" },
        credentials_available: snapshot.available,
        total_credentials: snapshot.total,
        credentials_banned: snapshot.banned,
    };
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(payload)).into_response()
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    let text = state.engine.metrics().render();
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        text,
    )
        .into_response()
}

/// Minimal status dashboard; reads only the in-memory snapshot.
pub async fn vhealth(State(state): State<AppState>) -> Response {
    let snapshot = state.engine.pool().snapshot().await;
    let models = state.engine.models().len();
    let html = format!(
        "<!DOCTYPE html>\n<html><head><title>auto-ai-router</title></head>\n<body>\n\
         <h1>auto-ai-router</h1>\n\
         <ul>\n\
         <li>models configured: {models}</li>\n\
         <li>credentials total: {}</li>\n\
         <li>credentials available: {}</li>\n\
         <li>credentials banned: {}</li>\n\
         </ul>\n</body></html>\n",
        snapshot.total, snapshot.available, snapshot.banned
    );
    ([(CONTENT_TYPE, "text/html; charset=utf-8")], html).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_payload_uses_spec_field_names() {
        let payload = HealthPayload {
            status: "healthy",
            credentials_available: 2,
            total_credentials: 3,
            credentials_banned: 1,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["status"], "healthy");
        assert_eq!(value["credentials_available"], 2);
        assert_eq!(value["total_credentials"], 3);
        assert_eq!(value["credentials_banned"], 1);
    }

    #[test]
    fn error_kinds_are_distinct_labels() {
        let labels = [
            error_kind(&GatewayError::InvalidAuth),
            error_kind(&GatewayError::UnknownModel("m".to_string())),
            error_kind(&GatewayError::NoEligibleCredential("m".to_string())),
            error_kind(&GatewayError::Timeout),
        ];
        let unique: std::collections::HashSet<_> = labels.iter().collect();
        assert_eq!(unique.len(), labels.len());
    }
}
