use aar_protocol::anthropic::messages::response::Message;
use aar_protocol::anthropic::messages::types::{ContentBlock, StopReason};
use aar_protocol::openai::chat::response::{
    ChatCompletionChoice, ChatCompletionObjectType, ChatCompletionResponse,
};
use aar_protocol::openai::chat::types::{
    FinishReason, ResponseMessage, Role, ToolCall, ToolCallFunction,
};

use crate::usage;

/// Fold an Anthropic message into a canonical chat-completion response.
pub fn adapt_chat_response(response: Message, alias: &str, created: i64) -> ChatCompletionResponse {
    let mut texts: Vec<String> = Vec::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();

    for block in &response.content {
        match block {
            ContentBlock::Text { text } => texts.push(text.clone()),
            ContentBlock::ToolUse { id, name, input } => {
                let arguments =
                    serde_json::to_string(input).unwrap_or_else(|_| "{}".to_string());
                tool_calls.push(ToolCall::Function {
                    id: id.clone(),
                    function: ToolCallFunction {
                        name: name.clone(),
                        arguments,
                    },
                });
            }
            // Reasoning is accounted for in usage, not surfaced as content.
            ContentBlock::Thinking { .. } => {}
            ContentBlock::Other => {}
        }
    }

    let text = (!texts.is_empty()).then(|| texts.join("\n"));
    let refused = matches!(response.stop_reason, Some(StopReason::Refusal));
    let (content, refusal) = if refused { (None, text) } else { (text, None) };

    let message = ResponseMessage {
        role: Role::Assistant,
        content,
        refusal,
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        images: None,
    };

    ChatCompletionResponse {
        id: response.id.clone(),
        object: ChatCompletionObjectType::ChatCompletion,
        created,
        model: alias.to_string(),
        choices: vec![ChatCompletionChoice {
            index: 0,
            message,
            finish_reason: map_stop_reason(response.stop_reason),
        }],
        usage: Some(usage::from_anthropic(&response.usage)),
    }
}

pub(super) fn map_stop_reason(reason: Option<StopReason>) -> FinishReason {
    match reason {
        Some(StopReason::MaxTokens) => FinishReason::Length,
        Some(StopReason::ToolUse) => FinishReason::ToolCalls,
        Some(StopReason::Refusal) => FinishReason::ContentFilter,
        Some(StopReason::EndTurn) | Some(StopReason::StopSequence) | None => FinishReason::Stop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aar_protocol::anthropic::messages::types::{
        JsonObject, MessageRole, MessageType, Usage as AnthropicUsage,
    };
    use serde_json::Value as JsonValue;

    fn message(content: Vec<ContentBlock>, stop_reason: Option<StopReason>) -> Message {
        Message {
            id: "msg_01".to_string(),
            r#type: MessageType::Message,
            role: MessageRole::Assistant,
            model: "claude-opus-4-1-20250805".to_string(),
            content,
            stop_reason,
            stop_sequence: None,
            usage: AnthropicUsage {
                input_tokens: 12,
                output_tokens: 34,
            },
        }
    }

    #[test]
    fn text_blocks_fold_into_content() {
        let out = adapt_chat_response(
            message(
                vec![
                    ContentBlock::Text {
                        text: "Paris".to_string(),
                    },
                    ContentBlock::Text {
                        text: "is the capital.".to_string(),
                    },
                ],
                Some(StopReason::EndTurn),
            ),
            "claude-opus-4-1",
            1_700_000_000,
        );

        assert_eq!(out.model, "claude-opus-4-1");
        let choice = &out.choices[0];
        assert_eq!(choice.message.content.as_deref(), Some("Paris\nis the capital."));
        assert_eq!(choice.finish_reason, FinishReason::Stop);
        let usage = out.usage.unwrap();
        assert_eq!(usage.total_tokens, 46);
    }

    #[test]
    fn tool_use_becomes_tool_calls() {
        let mut input = JsonObject::new();
        input.insert("city".to_string(), JsonValue::String("Tokyo".to_string()));
        let out = adapt_chat_response(
            message(
                vec![ContentBlock::ToolUse {
                    id: "toolu_9".to_string(),
                    name: "get_weather".to_string(),
                    input,
                }],
                Some(StopReason::ToolUse),
            ),
            "claude-opus-4-1",
            0,
        );

        let choice = &out.choices[0];
        assert_eq!(choice.finish_reason, FinishReason::ToolCalls);
        let calls = choice.message.tool_calls.as_ref().unwrap();
        let ToolCall::Function { id, function } = &calls[0];
        assert_eq!(id, "toolu_9");
        assert_eq!(function.name, "get_weather");
        let parsed: JsonValue = serde_json::from_str(&function.arguments).unwrap();
        assert_eq!(parsed["city"], "Tokyo");
    }

    #[test]
    fn refusal_moves_text_out_of_content() {
        let out = adapt_chat_response(
            message(
                vec![ContentBlock::Text {
                    text: "cannot help with that".to_string(),
                }],
                Some(StopReason::Refusal),
            ),
            "claude-opus-4-1",
            0,
        );
        let choice = &out.choices[0];
        assert!(choice.message.content.is_none());
        assert_eq!(choice.message.refusal.as_deref(), Some("cannot help with that"));
        assert_eq!(choice.finish_reason, FinishReason::ContentFilter);
    }

    #[test]
    fn stop_reason_mapping() {
        assert_eq!(map_stop_reason(Some(StopReason::MaxTokens)), FinishReason::Length);
        assert_eq!(
            map_stop_reason(Some(StopReason::StopSequence)),
            FinishReason::Stop
        );
        assert_eq!(map_stop_reason(None), FinishReason::Stop);
    }
}
