use aar_protocol::gemini::generate_content::response::{Candidate, GenerateContentResponse};
use aar_protocol::gemini::generate_content::types::FinishReason as GeminiFinishReason;
use aar_protocol::openai::chat::response::{
    ChatCompletionChoice, ChatCompletionObjectType, ChatCompletionResponse,
};
use aar_protocol::openai::chat::types::{
    FinishReason, MessageImage, ResponseMessage, Role, ToolCall, ToolCallFunction,
};

use crate::error::{TransformError, TransformResult};
use crate::usage;

/// Fold a Gemini generate-content response into a canonical chat response.
pub fn adapt_chat_response(
    response: GenerateContentResponse,
    alias: &str,
    created: i64,
) -> TransformResult<ChatCompletionResponse> {
    if response.candidates.is_empty() {
        return Err(TransformError::InvalidUpstream(
            "response contains no candidates".to_string(),
        ));
    }

    // Synthesized tool-call ids are stable within one response.
    let mut tool_counter = 0usize;
    let choices = response
        .candidates
        .iter()
        .enumerate()
        .map(|(position, candidate)| map_candidate(candidate, position, &mut tool_counter))
        .collect();

    Ok(ChatCompletionResponse {
        id: response
            .response_id
            .clone()
            .unwrap_or_else(|| format!("chatcmpl-{}", uuid::Uuid::new_v4())),
        object: ChatCompletionObjectType::ChatCompletion,
        created,
        model: alias.to_string(),
        choices,
        usage: response.usage_metadata.as_ref().map(usage::from_gemini),
    })
}

fn map_candidate(
    candidate: &Candidate,
    position: usize,
    tool_counter: &mut usize,
) -> ChatCompletionChoice {
    let mut texts: Vec<String> = Vec::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();
    let mut images: Vec<MessageImage> = Vec::new();

    if let Some(content) = &candidate.content {
        for part in &content.parts {
            if part.thought.unwrap_or(false) {
                continue;
            }
            if let Some(text) = &part.text
                && !text.is_empty()
            {
                texts.push(text.clone());
            }
            if let Some(call) = &part.function_call {
                let arguments = call
                    .args
                    .as_ref()
                    .and_then(|args| serde_json::to_string(args).ok())
                    .unwrap_or_else(|| "{}".to_string());
                let id = call.id.clone().unwrap_or_else(|| {
                    let id = format!("call_{tool_counter}");
                    *tool_counter += 1;
                    id
                });
                tool_calls.push(ToolCall::Function {
                    id,
                    function: ToolCallFunction {
                        name: call.name.clone(),
                        arguments,
                    },
                });
            }
            if let Some(blob) = &part.inline_data
                && blob.mime_type.starts_with("image/")
            {
                images.push(MessageImage {
                    b64_json: blob.data.clone(),
                    mime_type: Some(blob.mime_type.clone()),
                });
            }
        }
    }

    let finish_reason = if tool_calls.is_empty() {
        map_finish_reason(candidate.finish_reason)
    } else {
        FinishReason::ToolCalls
    };

    let message = ResponseMessage {
        role: Role::Assistant,
        content: (!texts.is_empty()).then(|| texts.join("\n")),
        refusal: None,
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        images: (!images.is_empty()).then_some(images),
    };

    ChatCompletionChoice {
        index: candidate.index.map(|value| value as i64).unwrap_or(position as i64),
        message,
        finish_reason,
    }
}

pub(super) fn map_finish_reason(reason: Option<GeminiFinishReason>) -> FinishReason {
    match reason {
        Some(GeminiFinishReason::MaxTokens) => FinishReason::Length,
        Some(GeminiFinishReason::Safety)
        | Some(GeminiFinishReason::Recitation)
        | Some(GeminiFinishReason::Blocklist)
        | Some(GeminiFinishReason::ProhibitedContent)
        | Some(GeminiFinishReason::Spii)
        | Some(GeminiFinishReason::ImageSafety) => FinishReason::ContentFilter,
        Some(GeminiFinishReason::MalformedFunctionCall) => FinishReason::ToolCalls,
        _ => FinishReason::Stop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aar_protocol::gemini::generate_content::types::{
        Blob, Content, ContentRole, FunctionCall, Part, UsageMetadata,
    };
    use serde_json::json;

    fn candidate(parts: Vec<Part>, finish: Option<GeminiFinishReason>) -> Candidate {
        Candidate {
            content: Some(Content {
                parts,
                role: Some(ContentRole::Model),
            }),
            finish_reason: finish,
            index: Some(0),
        }
    }

    fn response(candidates: Vec<Candidate>) -> GenerateContentResponse {
        GenerateContentResponse {
            candidates,
            usage_metadata: Some(UsageMetadata {
                prompt_token_count: Some(8),
                candidates_token_count: Some(12),
                thoughts_token_count: Some(3),
                total_token_count: Some(23),
                cached_content_token_count: None,
            }),
            model_version: Some("gemini-2.5-flash".to_string()),
            response_id: Some("resp-1".to_string()),
        }
    }

    #[test]
    fn text_parts_concatenate() {
        let out = adapt_chat_response(
            response(vec![candidate(
                vec![Part::text("Van Gogh,"), Part::text("The Starry Night")],
                Some(GeminiFinishReason::Stop),
            )]),
            "gemini-2.5-flash",
            0,
        )
        .unwrap();
        assert_eq!(
            out.choices[0].message.content.as_deref(),
            Some("Van Gogh,\nThe Starry Night")
        );
        let usage = out.usage.unwrap();
        assert_eq!(usage.completion_tokens, 15);
        assert_eq!(usage.total_tokens, 23);
    }

    #[test]
    fn function_calls_get_synthesized_ids() {
        let parts = vec![
            Part {
                function_call: Some(FunctionCall {
                    id: None,
                    name: "get_weather".to_string(),
                    args: Some(json!({"city": "Tokyo"})),
                }),
                ..Part::default()
            },
            Part {
                function_call: Some(FunctionCall {
                    id: None,
                    name: "get_time".to_string(),
                    args: None,
                }),
                ..Part::default()
            },
        ];
        let out = adapt_chat_response(
            response(vec![candidate(parts, Some(GeminiFinishReason::Stop))]),
            "gemini-2.5-flash",
            0,
        )
        .unwrap();

        let choice = &out.choices[0];
        assert_eq!(choice.finish_reason, FinishReason::ToolCalls);
        let calls = choice.message.tool_calls.as_ref().unwrap();
        let ToolCall::Function { id, function } = &calls[0];
        assert_eq!(id, "call_0");
        assert_eq!(function.name, "get_weather");
        let args: serde_json::Value = serde_json::from_str(&function.arguments).unwrap();
        assert_eq!(args["city"], "Tokyo");
        let ToolCall::Function { id, .. } = &calls[1];
        assert_eq!(id, "call_1");
    }

    #[test]
    fn thought_parts_are_skipped() {
        let parts = vec![
            Part {
                text: Some("internal reasoning".to_string()),
                thought: Some(true),
                ..Part::default()
            },
            Part::text("visible answer"),
        ];
        let out = adapt_chat_response(
            response(vec![candidate(parts, Some(GeminiFinishReason::Stop))]),
            "gemini-2.5-flash",
            0,
        )
        .unwrap();
        assert_eq!(out.choices[0].message.content.as_deref(), Some("visible answer"));
    }

    #[test]
    fn inline_images_surface_as_message_images() {
        let parts = vec![
            Part::text("here you go"),
            Part {
                inline_data: Some(Blob {
                    mime_type: "image/png".to_string(),
                    data: "aW1hZ2U=".to_string(),
                }),
                ..Part::default()
            },
        ];
        let out = adapt_chat_response(
            response(vec![candidate(parts, Some(GeminiFinishReason::Stop))]),
            "gemini-2.5-flash-image",
            0,
        )
        .unwrap();
        let images = out.choices[0].message.images.as_ref().unwrap();
        assert_eq!(images[0].b64_json, "aW1hZ2U=");
        assert_eq!(images[0].mime_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn safety_maps_to_content_filter() {
        assert_eq!(
            map_finish_reason(Some(GeminiFinishReason::Safety)),
            FinishReason::ContentFilter
        );
        assert_eq!(
            map_finish_reason(Some(GeminiFinishReason::MaxTokens)),
            FinishReason::Length
        );
    }

    #[test]
    fn empty_candidates_is_an_error() {
        let out = adapt_chat_response(
            GenerateContentResponse {
                candidates: Vec::new(),
                usage_metadata: None,
                model_version: None,
                response_id: None,
            },
            "gemini-2.5-flash",
            0,
        );
        assert!(out.is_err());
    }
}
