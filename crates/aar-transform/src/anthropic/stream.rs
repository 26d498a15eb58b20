use std::collections::BTreeMap;

use aar_protocol::anthropic::messages::stream::{
    ContentBlockDelta, StreamContentBlock, StreamEvent, StreamEventKnown,
};
use aar_protocol::openai::chat::stream::{
    ChatCompletionChunk, ChatCompletionChunkChoice, ChatCompletionChunkObjectType,
};
use aar_protocol::openai::chat::types::{
    FinishReason, Role, StreamDelta, ToolCallChunk, ToolCallChunkFunction, ToolCallChunkType,
    Usage,
};

use crate::anthropic::response::map_stop_reason;
use crate::error::{TransformError, TransformResult};
use crate::usage;
use crate::StreamItem;

/// Per-stream state converting Anthropic stream events into canonical
/// chat-completion chunks.
///
/// Prompt tokens arrive on `message_start`, completion tokens on the final
/// `message_delta`; tool-call fragments keep their content-block index so
/// clients can reassemble arguments by concatenation.
#[derive(Debug)]
pub struct AnthropicStreamAdapter {
    alias: String,
    created: i64,
    include_usage: bool,
    id: String,
    role_emitted: bool,
    finish_emitted: bool,
    prompt_tokens: Option<u32>,
    final_usage: Option<Usage>,
    /// Provider content-block index -> canonical tool_calls index.
    tool_indices: BTreeMap<u32, i64>,
    next_tool_index: i64,
}

impl AnthropicStreamAdapter {
    pub fn new(alias: impl Into<String>, created: i64, include_usage: bool) -> Self {
        Self {
            alias: alias.into(),
            created,
            include_usage,
            id: "unknown".to_string(),
            role_emitted: false,
            finish_emitted: false,
            prompt_tokens: None,
            final_usage: None,
            tool_indices: BTreeMap::new(),
            next_tool_index: 0,
        }
    }

    pub fn on_event(&mut self, event: StreamEvent) -> TransformResult<Vec<StreamItem>> {
        let event = match event {
            StreamEvent::Known(event) => event,
            StreamEvent::Unknown(_) => return Ok(Vec::new()),
        };

        let mut items = Vec::new();
        match event {
            StreamEventKnown::MessageStart { message } => {
                self.id = message.id;
                self.prompt_tokens = message.usage.input_tokens;
                self.role_emitted = true;
                items.push(StreamItem::Chunk(self.chunk(
                    StreamDelta {
                        role: Some(Role::Assistant),
                        content: None,
                        tool_calls: None,
                        refusal: None,
                    },
                    None,
                    None,
                )));
            }
            StreamEventKnown::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                StreamContentBlock::Text { text } => {
                    if !text.is_empty() {
                        items.push(StreamItem::Chunk(self.content_chunk(text)));
                    }
                }
                StreamContentBlock::ToolUse { id, name, .. } => {
                    let tool_index = self.allocate_tool_index(index);
                    items.push(StreamItem::Chunk(self.tool_chunk(ToolCallChunk {
                        index: tool_index,
                        id: Some(id),
                        r#type: Some(ToolCallChunkType::Function),
                        function: Some(ToolCallChunkFunction {
                            name: Some(name),
                            arguments: None,
                        }),
                    })));
                }
                StreamContentBlock::Thinking { .. } => {}
            },
            StreamEventKnown::ContentBlockDelta { index, delta } => match delta {
                ContentBlockDelta::TextDelta { text } => {
                    if !text.is_empty() {
                        items.push(StreamItem::Chunk(self.content_chunk(text)));
                    }
                }
                ContentBlockDelta::InputJsonDelta { partial_json } => {
                    if !partial_json.is_empty() {
                        let tool_index = self.allocate_tool_index(index);
                        items.push(StreamItem::Chunk(self.tool_chunk(ToolCallChunk {
                            index: tool_index,
                            id: None,
                            r#type: Some(ToolCallChunkType::Function),
                            function: Some(ToolCallChunkFunction {
                                name: None,
                                arguments: Some(partial_json),
                            }),
                        })));
                    }
                }
                ContentBlockDelta::ThinkingDelta { .. }
                | ContentBlockDelta::SignatureDelta { .. } => {}
            },
            StreamEventKnown::ContentBlockStop { .. } => {}
            StreamEventKnown::MessageDelta { delta, usage } => {
                self.final_usage = Some(usage::from_anthropic_counts(
                    self.prompt_tokens,
                    usage.output_tokens,
                ));
                if let Some(reason) = delta.stop_reason {
                    self.finish_emitted = true;
                    items.push(StreamItem::Chunk(self.finish_chunk(map_stop_reason(Some(
                        reason,
                    )))));
                }
            }
            StreamEventKnown::MessageStop => {
                if !self.finish_emitted {
                    self.finish_emitted = true;
                    items.push(StreamItem::Chunk(self.finish_chunk(FinishReason::Stop)));
                }
                if self.include_usage {
                    items.push(StreamItem::Chunk(self.usage_chunk()));
                }
                items.push(StreamItem::Done);
            }
            StreamEventKnown::Ping => {}
            StreamEventKnown::Error { error } => {
                return Err(TransformError::UpstreamStream(error.message));
            }
        }
        Ok(items)
    }

    fn allocate_tool_index(&mut self, block_index: u32) -> i64 {
        if let Some(index) = self.tool_indices.get(&block_index) {
            return *index;
        }
        let index = self.next_tool_index;
        self.next_tool_index += 1;
        self.tool_indices.insert(block_index, index);
        index
    }

    fn content_chunk(&mut self, text: String) -> ChatCompletionChunk {
        let role = self.take_role();
        self.chunk(
            StreamDelta {
                role,
                content: Some(text),
                tool_calls: None,
                refusal: None,
            },
            None,
            None,
        )
    }

    fn tool_chunk(&mut self, call: ToolCallChunk) -> ChatCompletionChunk {
        let role = self.take_role();
        self.chunk(
            StreamDelta {
                role,
                content: None,
                tool_calls: Some(vec![call]),
                refusal: None,
            },
            None,
            None,
        )
    }

    fn finish_chunk(&self, reason: FinishReason) -> ChatCompletionChunk {
        self.chunk(
            StreamDelta {
                role: None,
                content: None,
                tool_calls: None,
                refusal: None,
            },
            Some(reason),
            None,
        )
    }

    /// Trailing usage-only chunk, OpenAI-style: empty choices.
    fn usage_chunk(&self) -> ChatCompletionChunk {
        let usage = self
            .final_usage
            .clone()
            .unwrap_or_else(|| usage::from_anthropic_counts(self.prompt_tokens, None));
        ChatCompletionChunk {
            id: self.id.clone(),
            object: ChatCompletionChunkObjectType::ChatCompletionChunk,
            created: self.created,
            model: self.alias.clone(),
            choices: Vec::new(),
            usage: Some(usage),
        }
    }

    fn take_role(&mut self) -> Option<Role> {
        if self.role_emitted {
            None
        } else {
            self.role_emitted = true;
            Some(Role::Assistant)
        }
    }

    fn chunk(
        &self,
        delta: StreamDelta,
        finish_reason: Option<FinishReason>,
        usage: Option<Usage>,
    ) -> ChatCompletionChunk {
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
            usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aar_protocol::anthropic::messages::stream::{
        MessageDeltaBody, StreamMessage, StreamUsage,
    };
    use aar_protocol::anthropic::messages::types::{MessageRole, MessageType, StopReason};

    fn start_event() -> StreamEvent {
        StreamEvent::Known(StreamEventKnown::MessageStart {
            message: StreamMessage {
                id: "msg_stream".to_string(),
                r#type: MessageType::Message,
                role: MessageRole::Assistant,
                model: "claude-opus-4-1-20250805".to_string(),
                content: Vec::new(),
                stop_reason: None,
                usage: StreamUsage {
                    input_tokens: Some(9),
                    output_tokens: None,
                },
            },
        })
    }

    fn text_delta(index: u32, text: &str) -> StreamEvent {
        StreamEvent::Known(StreamEventKnown::ContentBlockDelta {
            index,
            delta: ContentBlockDelta::TextDelta {
                text: text.to_string(),
            },
        })
    }

    fn collect_chunks(items: Vec<StreamItem>) -> Vec<ChatCompletionChunk> {
        items
            .into_iter()
            .filter_map(|item| match item {
                StreamItem::Chunk(chunk) => Some(chunk),
                StreamItem::Done => None,
            })
            .collect()
    }

    #[test]
    fn text_stream_produces_ordered_deltas_and_done() {
        let mut adapter = AnthropicStreamAdapter::new("claude-opus-4-1", 1, true);

        let chunks = collect_chunks(adapter.on_event(start_event()).unwrap());
        assert_eq!(chunks[0].choices[0].delta.role, Some(Role::Assistant));
        assert_eq!(chunks[0].id, "msg_stream");

        let chunks = collect_chunks(adapter.on_event(text_delta(0, "1 2")).unwrap());
        assert_eq!(chunks[0].choices[0].delta.content.as_deref(), Some("1 2"));

        let chunks = collect_chunks(adapter.on_event(text_delta(0, " 3 4 5")).unwrap());
        assert_eq!(chunks[0].choices[0].delta.content.as_deref(), Some(" 3 4 5"));

        let chunks = collect_chunks(
            adapter
                .on_event(StreamEvent::Known(StreamEventKnown::MessageDelta {
                    delta: MessageDeltaBody {
                        stop_reason: Some(StopReason::EndTurn),
                        stop_sequence: None,
                    },
                    usage: StreamUsage {
                        input_tokens: None,
                        output_tokens: Some(11),
                    },
                }))
                .unwrap(),
        );
        assert_eq!(chunks[0].choices[0].finish_reason, Some(FinishReason::Stop));

        let items = adapter
            .on_event(StreamEvent::Known(StreamEventKnown::MessageStop))
            .unwrap();
        assert!(matches!(items.last(), Some(StreamItem::Done)));
        let usage_chunk = match &items[0] {
            StreamItem::Chunk(chunk) => chunk,
            other => panic!("unexpected item: {other:?}"),
        };
        let usage = usage_chunk.usage.as_ref().unwrap();
        assert_eq!(usage.prompt_tokens, 9);
        assert_eq!(usage.completion_tokens, 11);
        assert_eq!(usage.total_tokens, 20);
    }

    #[test]
    fn tool_fragments_keep_their_index() {
        let mut adapter = AnthropicStreamAdapter::new("claude-opus-4-1", 1, false);
        adapter.on_event(start_event()).unwrap();

        let chunks = collect_chunks(
            adapter
                .on_event(StreamEvent::Known(StreamEventKnown::ContentBlockStart {
                    index: 1,
                    content_block: StreamContentBlock::ToolUse {
                        id: "toolu_77".to_string(),
                        name: "get_weather".to_string(),
                        input: Default::default(),
                    },
                }))
                .unwrap(),
        );
        let call = &chunks[0].choices[0].delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.index, 0);
        assert_eq!(call.id.as_deref(), Some("toolu_77"));
        assert_eq!(
            call.function.as_ref().unwrap().name.as_deref(),
            Some("get_weather")
        );

        let chunks = collect_chunks(
            adapter
                .on_event(StreamEvent::Known(StreamEventKnown::ContentBlockDelta {
                    index: 1,
                    delta: ContentBlockDelta::InputJsonDelta {
                        partial_json: "{\"city\":".to_string(),
                    },
                }))
                .unwrap(),
        );
        let call = &chunks[0].choices[0].delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.index, 0);
        assert_eq!(
            call.function.as_ref().unwrap().arguments.as_deref(),
            Some("{\"city\":")
        );
    }

    #[test]
    fn ping_and_unknown_events_are_ignored() {
        let mut adapter = AnthropicStreamAdapter::new("claude-opus-4-1", 1, false);
        assert!(adapter
            .on_event(StreamEvent::Known(StreamEventKnown::Ping))
            .unwrap()
            .is_empty());
        assert!(adapter
            .on_event(StreamEvent::Unknown(serde_json::json!({"type": "new_thing"})))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn error_event_terminates() {
        let mut adapter = AnthropicStreamAdapter::new("claude-opus-4-1", 1, false);
        let err = adapter
            .on_event(StreamEvent::Known(StreamEventKnown::Error {
                error: aar_protocol::anthropic::error::ErrorDetail {
                    r#type: "overloaded_error".to_string(),
                    message: "overloaded".to_string(),
                },
            }))
            .unwrap_err();
        assert!(matches!(err, TransformError::UpstreamStream(_)));
    }
}
