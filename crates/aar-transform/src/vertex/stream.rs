use aar_protocol::gemini::generate_content::response::GenerateContentResponse;
use aar_protocol::openai::chat::stream::{
    ChatCompletionChunk, ChatCompletionChunkChoice, ChatCompletionChunkObjectType,
};
use aar_protocol::openai::chat::types::{
    FinishReason, Role, StreamDelta, ToolCallChunk, ToolCallChunkFunction, ToolCallChunkType,
    Usage,
};

use crate::usage;
use crate::vertex::response::map_finish_reason;
use crate::StreamItem;

/// Per-stream state converting Gemini streamed chunks into canonical
/// chat-completion chunks.
///
/// Text parts within one upstream chunk are aggregated into a single
/// content delta; function calls arrive whole, so each one becomes a single
/// complete tool-call chunk rather than argument fragments.
#[derive(Debug)]
pub struct VertexStreamAdapter {
    alias: String,
    created: i64,
    include_usage: bool,
    id: String,
    role_emitted: bool,
    finish_emitted: bool,
    tool_counter: i64,
    usage: Option<Usage>,
}

impl VertexStreamAdapter {
    pub fn new(alias: impl Into<String>, created: i64, include_usage: bool) -> Self {
        Self {
            alias: alias.into(),
            created,
            include_usage,
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
            role_emitted: false,
            finish_emitted: false,
            tool_counter: 0,
            usage: None,
        }
    }

    pub fn on_chunk(&mut self, response: GenerateContentResponse) -> Vec<StreamItem> {
        if let Some(id) = &response.response_id {
            self.id = id.clone();
        }
        if let Some(metadata) = &response.usage_metadata {
            self.usage = Some(usage::from_gemini(metadata));
        }

        let mut items = Vec::new();
        let Some(candidate) = response.candidates.first() else {
            return items;
        };

        if let Some(content) = &candidate.content {
            let mut text = String::new();
            for part in &content.parts {
                if part.thought.unwrap_or(false) {
                    continue;
                }
                if let Some(fragment) = &part.text {
                    text.push_str(fragment);
                }
            }
            if !text.is_empty() {
                let role = self.take_role();
                items.push(StreamItem::Chunk(self.chunk(
                    StreamDelta {
                        role,
                        content: Some(text),
                        tool_calls: None,
                        refusal: None,
                    },
                    None,
                )));
            }

            for part in &content.parts {
                let Some(call) = &part.function_call else {
                    continue;
                };
                let arguments = call
                    .args
                    .as_ref()
                    .and_then(|args| serde_json::to_string(args).ok())
                    .unwrap_or_else(|| "{}".to_string());
                let index = self.tool_counter;
                self.tool_counter += 1;
                let id = call
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("call_{index}"));
                let role = self.take_role();
                items.push(StreamItem::Chunk(self.chunk(
                    StreamDelta {
                        role,
                        content: None,
                        tool_calls: Some(vec![ToolCallChunk {
                            index,
                            id: Some(id),
                            r#type: Some(ToolCallChunkType::Function),
                            function: Some(ToolCallChunkFunction {
                                name: Some(call.name.clone()),
                                arguments: Some(arguments),
                            }),
                        }]),
                        refusal: None,
                    },
                    None,
                )));
            }
        }

        if let Some(reason) = candidate.finish_reason {
            self.finish_emitted = true;
            let finish = if self.tool_counter > 0 {
                FinishReason::ToolCalls
            } else {
                map_finish_reason(Some(reason))
            };
            let role = self.take_role();
            items.push(StreamItem::Chunk(self.chunk(
                StreamDelta {
                    role,
                    content: None,
                    tool_calls: None,
                    refusal: None,
                },
                Some(finish),
            )));
        }

        items
    }

    /// Upstream body ended; close out the canonical stream.
    pub fn finish(&mut self) -> Vec<StreamItem> {
        let mut items = Vec::new();
        if !self.finish_emitted {
            self.finish_emitted = true;
            let role = self.take_role();
            items.push(StreamItem::Chunk(self.chunk(
                StreamDelta {
                    role,
                    content: None,
                    tool_calls: None,
                    refusal: None,
                },
                Some(FinishReason::Stop),
            )));
        }
        if self.include_usage && let Some(usage) = self.usage.clone() {
            items.push(StreamItem::Chunk(ChatCompletionChunk {
                id: self.id.clone(),
                object: ChatCompletionChunkObjectType::ChatCompletionChunk,
                created: self.created,
                model: self.alias.clone(),
                choices: Vec::new(),
                usage: Some(usage),
            }));
        }
        items.push(StreamItem::Done);
        items
    }

    fn take_role(&mut self) -> Option<Role> {
        if self.role_emitted {
            None
        } else {
            self.role_emitted = true;
            Some(Role::Assistant)
        }
    }

    fn chunk(&self, delta: StreamDelta, finish_reason: Option<FinishReason>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: ChatCompletionChunkObjectType::ChatCompletionChunk,
            created: self.created,
            model: self.alias.clone(),
            choices: vec![ChatCompletionChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
            usage: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aar_protocol::gemini::generate_content::response::Candidate;
    use aar_protocol::gemini::generate_content::types::{
        Content, ContentRole, FinishReason as GeminiFinishReason, FunctionCall, Part,
        UsageMetadata,
    };
    use serde_json::json;

    fn text_chunk(text: &str, finish: Option<GeminiFinishReason>) -> GenerateContentResponse {
        GenerateContentResponse {
            candidates: vec![Candidate {
                content: Some(Content {
                    parts: vec![Part::text(text)],
                    role: Some(ContentRole::Model),
                }),
                finish_reason: finish,
                index: Some(0),
            }],
            usage_metadata: None,
            model_version: None,
            response_id: None,
        }
    }

    fn chunks(items: Vec<StreamItem>) -> Vec<ChatCompletionChunk> {
        items
            .into_iter()
            .filter_map(|item| match item {
                StreamItem::Chunk(chunk) => Some(chunk),
                StreamItem::Done => None,
            })
            .collect()
    }

    #[test]
    fn text_chunks_aggregate_per_upstream_chunk() {
        let mut adapter = VertexStreamAdapter::new("gemini-2.5-flash", 5, false);

        let out = chunks(adapter.on_chunk(text_chunk("Hello", None)));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].choices[0].delta.role, Some(Role::Assistant));
        assert_eq!(out[0].choices[0].delta.content.as_deref(), Some("Hello"));
        assert_eq!(out[0].model, "gemini-2.5-flash");

        let out = chunks(adapter.on_chunk(text_chunk(" world", Some(GeminiFinishReason::Stop))));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].choices[0].delta.content.as_deref(), Some(" world"));
        assert_eq!(out[0].choices[0].delta.role, None);
        assert_eq!(out[1].choices[0].finish_reason, Some(FinishReason::Stop));
    }

    #[test]
    fn function_call_is_one_complete_tool_chunk() {
        let mut adapter = VertexStreamAdapter::new("gemini-2.5-flash", 5, false);
        let response = GenerateContentResponse {
            candidates: vec![Candidate {
                content: Some(Content {
                    parts: vec![Part {
                        function_call: Some(FunctionCall {
                            id: None,
                            name: "get_weather".to_string(),
                            args: Some(json!({"city": "Tokyo"})),
                        }),
                        ..Part::default()
                    }],
                    role: Some(ContentRole::Model),
                }),
                finish_reason: Some(GeminiFinishReason::Stop),
                index: Some(0),
            }],
            usage_metadata: None,
            model_version: None,
            response_id: None,
        };

        let out = chunks(adapter.on_chunk(response));
        let call = &out[0].choices[0].delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.id.as_deref(), Some("call_0"));
        let function = call.function.as_ref().unwrap();
        assert_eq!(function.name.as_deref(), Some("get_weather"));
        let args: serde_json::Value =
            serde_json::from_str(function.arguments.as_deref().unwrap()).unwrap();
        assert_eq!(args["city"], "Tokyo");
        // Tool-call emission forces the tool_calls finish reason.
        assert_eq!(
            out.last().unwrap().choices[0].finish_reason,
            Some(FinishReason::ToolCalls)
        );
    }

    #[test]
    fn finish_emits_usage_then_done_when_requested() {
        let mut adapter = VertexStreamAdapter::new("gemini-2.5-flash", 5, true);
        let mut response = text_chunk("done", Some(GeminiFinishReason::Stop));
        response.usage_metadata = Some(UsageMetadata {
            prompt_token_count: Some(4),
            candidates_token_count: Some(6),
            thoughts_token_count: None,
            total_token_count: Some(10),
            cached_content_token_count: None,
        });
        adapter.on_chunk(response);

        let items = adapter.finish();
        assert_eq!(items.len(), 2);
        match &items[0] {
            StreamItem::Chunk(chunk) => {
                let usage = chunk.usage.as_ref().unwrap();
                assert_eq!(usage.total_tokens, 10);
                assert!(chunk.choices.is_empty());
            }
            other => panic!("unexpected item: {other:?}"),
        }
        assert!(matches!(items[1], StreamItem::Done));
    }

    #[test]
    fn abrupt_end_without_finish_reason_closes_cleanly() {
        let mut adapter = VertexStreamAdapter::new("gemini-2.5-flash", 5, false);
        adapter.on_chunk(text_chunk("partial", None));
        let items = adapter.finish();
        match &items[0] {
            StreamItem::Chunk(chunk) => {
                assert_eq!(chunk.choices[0].finish_reason, Some(FinishReason::Stop));
            }
            other => panic!("unexpected item: {other:?}"),
        }
        assert!(matches!(items.last(), Some(StreamItem::Done)));
    }
}
