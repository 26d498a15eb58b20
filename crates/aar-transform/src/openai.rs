//! OpenAI upstream adapter: near-identity, only the model id is rewritten
//! between the client-facing alias and the provider-native id.

use aar_protocol::openai::chat::request::ChatCompletionRequest;
use aar_protocol::openai::chat::response::ChatCompletionResponse;
use aar_protocol::openai::chat::stream::ChatCompletionChunk;
use aar_protocol::openai::embeddings::{EmbeddingsRequest, EmbeddingsResponse};

use crate::usage;

pub fn adapt_chat_request(
    mut request: ChatCompletionRequest,
    upstream_model: &str,
) -> ChatCompletionRequest {
    request.model = upstream_model.to_string();
    request
}

pub fn adapt_chat_response(
    mut response: ChatCompletionResponse,
    alias: &str,
) -> ChatCompletionResponse {
    response.model = alias.to_string();
    response.usage = response.usage.map(usage::normalize_openai);
    response
}

pub fn adapt_chunk(mut chunk: ChatCompletionChunk, alias: &str) -> ChatCompletionChunk {
    chunk.model = alias.to_string();
    chunk.usage = chunk.usage.map(usage::normalize_openai);
    chunk
}

pub fn adapt_embeddings_request(
    mut request: EmbeddingsRequest,
    upstream_model: &str,
) -> EmbeddingsRequest {
    request.model = upstream_model.to_string();
    request
}

pub fn adapt_embeddings_response(
    mut response: EmbeddingsResponse,
    alias: &str,
) -> EmbeddingsResponse {
    response.model = alias.to_string();
    response.usage = usage::normalize_openai(response.usage);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use aar_protocol::openai::chat::types::{RequestMessage, UserContent, UserMessage};

    fn chat_request(model: &str) -> ChatCompletionRequest {
        ChatCompletionRequest {
            messages: vec![RequestMessage::User(UserMessage {
                content: UserContent::Text("hi".to_string()),
                name: None,
            })],
            model: model.to_string(),
            frequency_penalty: None,
            presence_penalty: None,
            max_tokens: None,
            max_completion_tokens: None,
            n: None,
            seed: None,
            stop: None,
            stream: None,
            stream_options: None,
            temperature: None,
            top_p: None,
            response_format: None,
            tools: None,
            tool_choice: None,
            user: None,
        }
    }

    #[test]
    fn request_model_is_rewritten() {
        let out = adapt_chat_request(chat_request("my-alias"), "gpt-4o-mini-2024-07-18");
        assert_eq!(out.model, "gpt-4o-mini-2024-07-18");
    }
}
