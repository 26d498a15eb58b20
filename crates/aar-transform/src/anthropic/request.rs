use aar_protocol::anthropic::messages::request::CreateMessageRequest;
use aar_protocol::anthropic::messages::types::{
    ContentBlockParam, ImageMediaType, ImageSource, JsonObject, MessageContent, MessageParam,
    MessageRole, Tool as AnthropicTool, ToolChoice as AnthropicToolChoice, ToolResultContent,
};
use aar_protocol::openai::chat::request::ChatCompletionRequest;
use aar_protocol::openai::chat::types::{
    AssistantMessage, ImageUrl, RequestMessage, ToolCall, ToolChoice, ToolChoiceMode,
    ToolDefinition, ToolMessage, UserContent, UserContentPart, UserMessage,
};
use serde_json::{json, Value as JsonValue};

use crate::error::{TransformError, TransformResult};

/// The provider requires `max_tokens`; used when the canonical request
/// carries no completion budget.
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Convert a canonical chat request into an Anthropic create-message request.
pub fn adapt_chat_request(
    request: &ChatCompletionRequest,
    upstream_model: &str,
) -> TransformResult<CreateMessageRequest> {
    let mut system_texts: Vec<String> = Vec::new();
    let mut messages: Vec<MessageParam> = Vec::new();
    // Consecutive tool results fold into a single user turn.
    let mut pending_tool_results: Vec<ContentBlockParam> = Vec::new();

    for message in &request.messages {
        if !matches!(message, RequestMessage::Tool(_)) && !pending_tool_results.is_empty() {
            messages.push(MessageParam {
                role: MessageRole::User,
                content: MessageContent::Blocks(std::mem::take(&mut pending_tool_results)),
            });
        }
        match message {
            RequestMessage::System(system) => {
                if !system.content.is_empty() {
                    system_texts.push(system.content.clone());
                }
            }
            RequestMessage::User(user) => {
                messages.push(map_user_message(user)?);
            }
            RequestMessage::Assistant(assistant) => {
                messages.push(map_assistant_message(assistant));
            }
            RequestMessage::Tool(tool) => {
                pending_tool_results.push(map_tool_result(tool));
            }
        }
    }
    if !pending_tool_results.is_empty() {
        messages.push(MessageParam {
            role: MessageRole::User,
            content: MessageContent::Blocks(pending_tool_results),
        });
    }

    let system = if system_texts.is_empty() {
        None
    } else {
        Some(system_texts.join("\n"))
    };

    // `tool_choice: "none"` drops the tool definitions entirely.
    let drop_tools = matches!(
        request.tool_choice,
        Some(ToolChoice::Mode(ToolChoiceMode::None))
    );
    let tools = if drop_tools {
        None
    } else {
        map_tools(request.tools.as_deref())
    };
    let tool_choice = if drop_tools {
        None
    } else {
        map_tool_choice(request.tool_choice.as_ref())
    };

    let max_tokens = match request.completion_budget() {
        Some(value) if value > 0 => value.min(u32::MAX as i64) as u32,
        _ => DEFAULT_MAX_TOKENS,
    };

    Ok(CreateMessageRequest {
        model: upstream_model.to_string(),
        max_tokens,
        messages,
        system,
        stop_sequences: map_stop_sequences(request),
        stream: request.stream,
        temperature: request.temperature.map(|value| value.clamp(0.0, 1.0)),
        top_p: request.top_p,
        tools,
        tool_choice,
    })
}

fn map_user_message(message: &UserMessage) -> TransformResult<MessageParam> {
    let content = match &message.content {
        UserContent::Text(text) => MessageContent::Text(text.clone()),
        UserContent::Parts(parts) => {
            let mut blocks = Vec::new();
            for part in parts {
                match part {
                    UserContentPart::Text { text } => {
                        if !text.is_empty() {
                            blocks.push(ContentBlockParam::Text { text: text.clone() });
                        }
                    }
                    UserContentPart::ImageUrl { image_url } => {
                        blocks.push(map_image_url(image_url));
                    }
                    UserContentPart::File { .. } => {
                        return Err(TransformError::Unsupported(
                            "file content parts for anthropic models",
                        ));
                    }
                }
            }
            MessageContent::Blocks(blocks)
        }
    };
    Ok(MessageParam {
        role: MessageRole::User,
        content,
    })
}

fn map_assistant_message(message: &AssistantMessage) -> MessageParam {
    let mut blocks = Vec::new();
    if let Some(content) = &message.content
        && !content.is_empty()
    {
        blocks.push(ContentBlockParam::Text {
            text: content.clone(),
        });
    }
    if let Some(tool_calls) = &message.tool_calls {
        for call in tool_calls {
            blocks.push(map_tool_call(call));
        }
    }

    let content = match blocks.as_slice() {
        [ContentBlockParam::Text { text }] => MessageContent::Text(text.clone()),
        _ => MessageContent::Blocks(blocks),
    };
    MessageParam {
        role: MessageRole::Assistant,
        content,
    }
}

fn map_tool_result(message: &ToolMessage) -> ContentBlockParam {
    ContentBlockParam::ToolResult {
        tool_use_id: message.tool_call_id.clone(),
        content: Some(ToolResultContent::Text(message.content.clone())),
        is_error: None,
    }
}

fn map_tool_call(call: &ToolCall) -> ContentBlockParam {
    let ToolCall::Function { id, function } = call;
    ContentBlockParam::ToolUse {
        id: id.clone(),
        name: function.name.clone(),
        input: parse_arguments(&function.arguments),
    }
}

/// Arguments arrive as a JSON-encoded string. Anything that does not parse
/// as an object is wrapped so the provider still receives valid input.
fn parse_arguments(arguments: &str) -> JsonObject {
    match serde_json::from_str::<JsonValue>(arguments) {
        Ok(JsonValue::Object(map)) => map,
        Ok(other) => {
            let mut map = JsonObject::new();
            map.insert("arguments".to_string(), other);
            map
        }
        Err(_) => {
            let mut map = JsonObject::new();
            map.insert(
                "arguments".to_string(),
                JsonValue::String(arguments.to_string()),
            );
            map
        }
    }
}

fn map_image_url(image: &ImageUrl) -> ContentBlockParam {
    if let Some((mime, data)) = parse_data_url(&image.url)
        && let Some(media_type) = ImageMediaType::from_mime(&mime)
    {
        return ContentBlockParam::Image {
            source: ImageSource::Base64 { media_type, data },
        };
    }
    ContentBlockParam::Image {
        source: ImageSource::Url {
            url: image.url.clone(),
        },
    }
}

fn parse_data_url(url: &str) -> Option<(String, String)> {
    let rest = url.strip_prefix("data:")?;
    let (meta, data) = rest.split_once(',')?;
    let (mime, encoding) = meta.split_once(';')?;
    if encoding != "base64" {
        return None;
    }
    Some((mime.to_string(), data.to_string()))
}

fn map_tools(tools: Option<&[ToolDefinition]>) -> Option<Vec<AnthropicTool>> {
    let tools = tools?;
    let mapped: Vec<AnthropicTool> = tools
        .iter()
        .map(|tool| {
            let ToolDefinition::Function { function } = tool;
            AnthropicTool {
                name: function.name.clone(),
                description: function.description.clone(),
                input_schema: function
                    .parameters
                    .clone()
                    .unwrap_or_else(|| json!({"type": "object"})),
            }
        })
        .collect();
    (!mapped.is_empty()).then_some(mapped)
}

fn map_tool_choice(choice: Option<&ToolChoice>) -> Option<AnthropicToolChoice> {
    match choice? {
        // "auto" is the provider default; omit it.
        ToolChoice::Mode(ToolChoiceMode::Auto) => None,
        ToolChoice::Mode(ToolChoiceMode::Required) => Some(AnthropicToolChoice::Any),
        // "none" is handled by dropping the tools before this point.
        ToolChoice::Mode(ToolChoiceMode::None) => None,
        ToolChoice::Named(named) => Some(AnthropicToolChoice::Tool {
            name: named.function.name.clone(),
        }),
    }
}

fn map_stop_sequences(request: &ChatCompletionRequest) -> Option<Vec<String>> {
    let sequences: Vec<String> = request
        .stop
        .clone()?
        .into_sequences()
        .into_iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect();
    (!sequences.is_empty()).then_some(sequences)
}
