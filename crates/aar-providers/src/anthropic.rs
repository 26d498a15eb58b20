use bytes::Bytes;

use aar_pool::ApiKeyCredential;
use aar_protocol::anthropic::messages::request::CreateMessageRequest;

use crate::errors::{ProviderError, ProviderResult};
use crate::headers::{set_accept_json, set_api_key, set_content_type_json};
use crate::request::{build_url, HttpMethod, UpstreamRequest};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

pub fn messages_request(
    credential: &ApiKeyCredential,
    body: &CreateMessageRequest,
) -> ProviderResult<UpstreamRequest> {
    let base = credential.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
    let is_stream = body.stream.unwrap_or(false);
    let payload =
        serde_json::to_vec(body).map_err(|err| ProviderError::Serialize(err.to_string()))?;
    let mut headers = Vec::new();
    set_api_key(&mut headers, &credential.api_key);
    headers.push(("anthropic-version".to_string(), API_VERSION.to_string()));
    set_accept_json(&mut headers);
    set_content_type_json(&mut headers);
    Ok(UpstreamRequest {
        method: HttpMethod::Post,
        url: build_url(base, "/v1/messages"),
        headers,
        body: Some(Bytes::from(payload)),
        is_stream,
    })
}
