use bytes::Bytes;

use aar_pool::ApiKeyCredential;
use aar_protocol::openai::chat::request::ChatCompletionRequest;
use aar_protocol::openai::embeddings::EmbeddingsRequest;
use aar_protocol::openai::images::ImageGenerationRequest;

use crate::errors::{ProviderError, ProviderResult};
use crate::headers::{set_accept_json, set_bearer, set_content_type_json};
use crate::request::{build_url, HttpMethod, UpstreamRequest};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

pub fn chat_request(
    credential: &ApiKeyCredential,
    body: &ChatCompletionRequest,
) -> ProviderResult<UpstreamRequest> {
    post_json(credential, "/v1/chat/completions", body, body.is_stream())
}

pub fn embeddings_request(
    credential: &ApiKeyCredential,
    body: &EmbeddingsRequest,
) -> ProviderResult<UpstreamRequest> {
    post_json(credential, "/v1/embeddings", body, false)
}

pub fn image_request(
    credential: &ApiKeyCredential,
    body: &ImageGenerationRequest,
) -> ProviderResult<UpstreamRequest> {
    post_json(credential, "/v1/images/generations", body, false)
}

fn post_json<T: serde::Serialize>(
    credential: &ApiKeyCredential,
    path: &str,
    body: &T,
    is_stream: bool,
) -> ProviderResult<UpstreamRequest> {
    let base = credential.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
    let body =
        serde_json::to_vec(body).map_err(|err| ProviderError::Serialize(err.to_string()))?;
    let mut headers = Vec::new();
    set_bearer(&mut headers, &credential.api_key);
    set_accept_json(&mut headers);
    set_content_type_json(&mut headers);
    Ok(UpstreamRequest {
        method: HttpMethod::Post,
        url: build_url(base, path),
        headers,
        body: Some(Bytes::from(body)),
        is_stream,
    })
}
