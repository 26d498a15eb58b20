pub mod token;

use bytes::Bytes;

use aar_pool::ServiceAccountCredential;
use aar_protocol::gemini::generate_content::request::GenerateContentRequest;

use crate::errors::{ProviderError, ProviderResult};
use crate::headers::{set_accept_json, set_bearer, set_content_type_json};
use crate::request::{build_url, HttpMethod, UpstreamRequest};
use token::VertexTokenProvider;

const DEFAULT_LOCATION: &str = "us-central1";

/// Regional Vertex endpoint; an explicit base_url on the credential wins.
fn base_url(credential: &ServiceAccountCredential) -> String {
    if let Some(base) = &credential.base_url {
        return base.clone();
    }
    let location = effective_location(credential);
    format!("https://{location}-aiplatform.googleapis.com")
}

fn effective_location(credential: &ServiceAccountCredential) -> &str {
    let location = credential.location.trim();
    if location.is_empty() {
        DEFAULT_LOCATION
    } else {
        location
    }
}

fn model_path(credential: &ServiceAccountCredential, model: &str, verb: &str) -> String {
    let project = &credential.project_id;
    let location = effective_location(credential);
    let model = model.strip_prefix("models/").unwrap_or(model);
    format!("/v1/projects/{project}/locations/{location}/publishers/google/models/{model}:{verb}")
}

pub async fn chat_request(
    tokens: &VertexTokenProvider,
    credential: &ServiceAccountCredential,
    model: &str,
    body: &GenerateContentRequest,
    is_stream: bool,
) -> ProviderResult<UpstreamRequest> {
    let verb = if is_stream {
        "streamGenerateContent"
    } else {
        "generateContent"
    };
    let mut path = model_path(credential, model, verb);
    if is_stream {
        // SSE framing instead of a JSON array body.
        path.push_str("?alt=sse");
    }
    post_json(tokens, credential, &path, body, is_stream).await
}

pub async fn predict_request<T: serde::Serialize>(
    tokens: &VertexTokenProvider,
    credential: &ServiceAccountCredential,
    model: &str,
    body: &T,
) -> ProviderResult<UpstreamRequest> {
    let path = model_path(credential, model, "predict");
    post_json(tokens, credential, &path, body, false).await
}

async fn post_json<T: serde::Serialize>(
    tokens: &VertexTokenProvider,
    credential: &ServiceAccountCredential,
    path: &str,
    body: &T,
    is_stream: bool,
) -> ProviderResult<UpstreamRequest> {
    let access_token = tokens.access_token(credential).await?;
    let payload =
        serde_json::to_vec(body).map_err(|err| ProviderError::Serialize(err.to_string()))?;
    let mut headers = Vec::new();
    set_bearer(&mut headers, &access_token);
    set_accept_json(&mut headers);
    set_content_type_json(&mut headers);
    Ok(UpstreamRequest {
        method: HttpMethod::Post,
        url: build_url(&base_url(credential), path),
        headers,
        body: Some(Bytes::from(payload)),
        is_stream,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> ServiceAccountCredential {
        ServiceAccountCredential {
            project_id: "my-project".to_string(),
            location: "europe-west4".to_string(),
            client_email: "svc@my-project.iam.gserviceaccount.com".to_string(),
            private_key: String::new(),
            private_key_id: String::new(),
            token_uri: None,
            base_url: None,
        }
    }

    #[test]
    fn model_path_includes_project_and_location() {
        let path = model_path(&credential(), "gemini-2.5-flash", "generateContent");
        assert_eq!(
            path,
            "/v1/projects/my-project/locations/europe-west4/publishers/google/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn base_url_is_regional() {
        assert_eq!(
            base_url(&credential()),
            "https://europe-west4-aiplatform.googleapis.com"
        );
    }
}
