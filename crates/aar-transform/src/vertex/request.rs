use std::collections::HashMap;

use aar_protocol::gemini::generate_content::request::GenerateContentRequest;
use aar_protocol::gemini::generate_content::types::{
    Blob, Content, ContentRole, FileData, FunctionCall, FunctionCallingConfig,
    FunctionCallingMode, FunctionDeclaration, FunctionResponse, GenerationConfig, Part,
    Tool as GeminiTool, ToolConfig,
};
use aar_protocol::openai::chat::request::ChatCompletionRequest;
use aar_protocol::openai::chat::types::{
    AssistantMessage, ImageUrl, InputFile, RequestMessage, ResponseFormat, ToolCall, ToolChoice,
    ToolChoiceMode, ToolDefinition, ToolMessage, UserContent, UserContentPart, UserMessage,
};
use serde_json::Value as JsonValue;

use crate::error::TransformResult;
use crate::vertex::schema::sanitize_schema;

/// Convert a canonical chat request into a Gemini generate-content request.
///
/// `image_output` mirrors the model binding capability: image-emitting chat
/// models need the IMAGE response modality requested explicitly.
pub fn adapt_chat_request(
    request: &ChatCompletionRequest,
    image_output: bool,
) -> TransformResult<GenerateContentRequest> {
    let mut system_texts: Vec<String> = Vec::new();
    let mut contents: Vec<Content> = Vec::new();
    // tool_call_id -> function name, so tool results can name their function.
    let mut call_names: HashMap<String, String> = HashMap::new();

    for message in &request.messages {
        match message {
            RequestMessage::System(system) => {
                if !system.content.is_empty() {
                    system_texts.push(system.content.clone());
                }
            }
            RequestMessage::User(user) => {
                if let Some(content) = map_user_message(user) {
                    contents.push(content);
                }
            }
            RequestMessage::Assistant(assistant) => {
                if let Some(content) = map_assistant_message(assistant, &mut call_names) {
                    contents.push(content);
                }
            }
            RequestMessage::Tool(tool) => {
                contents.push(map_tool_message(tool, &call_names));
            }
        }
    }

    let system_instruction = (!system_texts.is_empty()).then(|| Content {
        parts: vec![Part::text(system_texts.join("\n"))],
        role: None,
    });

    let tools = map_tools(request.tools.as_deref());
    let tool_config = map_tool_config(request.tool_choice.as_ref());
    let generation_config = map_generation_config(request, image_output);

    Ok(GenerateContentRequest {
        contents,
        system_instruction,
        tools,
        tool_config,
        generation_config,
    })
}

fn map_user_message(message: &UserMessage) -> Option<Content> {
    let parts = match &message.content {
        UserContent::Text(text) => {
            if text.is_empty() {
                Vec::new()
            } else {
                vec![Part::text(text.clone())]
            }
        }
        UserContent::Parts(items) => {
            let mut parts = Vec::new();
            for item in items {
                match item {
                    UserContentPart::Text { text } => {
                        if !text.is_empty() {
                            parts.push(Part::text(text.clone()));
                        }
                    }
                    UserContentPart::ImageUrl { image_url } => {
                        parts.push(map_image_url(image_url));
                    }
                    UserContentPart::File { file } => {
                        parts.push(map_input_file(file));
                    }
                }
            }
            parts
        }
    };

    (!parts.is_empty()).then_some(Content {
        parts,
        role: Some(ContentRole::User),
    })
}

fn map_assistant_message(
    message: &AssistantMessage,
    call_names: &mut HashMap<String, String>,
) -> Option<Content> {
    let mut parts = Vec::new();
    if let Some(content) = &message.content
        && !content.is_empty()
    {
        parts.push(Part::text(content.clone()));
    }
    if let Some(tool_calls) = &message.tool_calls {
        for call in tool_calls {
            let ToolCall::Function { id, function } = call;
            call_names.insert(id.clone(), function.name.clone());
            let args = serde_json::from_str(&function.arguments)
                .unwrap_or(JsonValue::String(function.arguments.clone()));
            parts.push(Part {
                function_call: Some(FunctionCall {
                    id: Some(id.clone()),
                    name: function.name.clone(),
                    args: Some(args),
                }),
                ..Part::default()
            });
        }
    }

    (!parts.is_empty()).then_some(Content {
        parts,
        role: Some(ContentRole::Model),
    })
}

fn map_tool_message(message: &ToolMessage, call_names: &HashMap<String, String>) -> Content {
    let name = call_names
        .get(&message.tool_call_id)
        .cloned()
        .unwrap_or_else(|| message.tool_call_id.clone());
    let response = serde_json::from_str(&message.content)
        .unwrap_or(JsonValue::String(message.content.clone()));
    Content {
        parts: vec![Part {
            function_response: Some(FunctionResponse {
                id: Some(message.tool_call_id.clone()),
                name,
                response,
            }),
            ..Part::default()
        }],
        role: Some(ContentRole::User),
    }
}

fn map_image_url(image: &ImageUrl) -> Part {
    if let Some((mime, data)) = parse_data_url(&image.url) {
        return Part {
            inline_data: Some(Blob {
                mime_type: mime,
                data,
            }),
            ..Part::default()
        };
    }
    Part {
        file_data: Some(FileData {
            mime_type: guess_mime(&image.url),
            file_uri: image.url.clone(),
        }),
        ..Part::default()
    }
}

fn map_input_file(file: &InputFile) -> Part {
    if let Some(file_id) = &file.file_id {
        return Part {
            file_data: Some(FileData {
                mime_type: file.format.clone(),
                file_uri: file_id.clone(),
            }),
            ..Part::default()
        };
    }
    if let Some(data) = &file.file_data {
        return Part {
            inline_data: Some(Blob {
                mime_type: file
                    .format
                    .clone()
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
                data: data.clone(),
            }),
            ..Part::default()
        };
    }
    Part::text(format!(
        "[file:{}]",
        file.filename.as_deref().unwrap_or("file")
    ))
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

fn guess_mime(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    let extension = path.rsplit('.').next()?.to_ascii_lowercase();
    let mime = match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "pdf" => "application/pdf",
        _ => return None,
    };
    Some(mime.to_string())
}

fn map_tools(tools: Option<&[ToolDefinition]>) -> Option<Vec<GeminiTool>> {
    let tools = tools?;
    let declarations: Vec<FunctionDeclaration> = tools
        .iter()
        .map(|tool| {
            let ToolDefinition::Function { function } = tool;
            FunctionDeclaration {
                name: function.name.clone(),
                description: function.description.clone(),
                parameters: function.parameters.as_ref().map(sanitize_schema),
            }
        })
        .collect();
    (!declarations.is_empty()).then(|| {
        vec![GeminiTool {
            function_declarations: Some(declarations),
        }]
    })
}

fn map_tool_config(choice: Option<&ToolChoice>) -> Option<ToolConfig> {
    let config = match choice? {
        ToolChoice::Mode(ToolChoiceMode::Auto) => FunctionCallingConfig {
            mode: Some(FunctionCallingMode::Auto),
            allowed_function_names: None,
        },
        ToolChoice::Mode(ToolChoiceMode::Required) => FunctionCallingConfig {
            mode: Some(FunctionCallingMode::Any),
            allowed_function_names: None,
        },
        ToolChoice::Mode(ToolChoiceMode::None) => FunctionCallingConfig {
            mode: Some(FunctionCallingMode::None),
            allowed_function_names: None,
        },
        ToolChoice::Named(named) => FunctionCallingConfig {
            mode: Some(FunctionCallingMode::Any),
            allowed_function_names: Some(vec![named.function.name.clone()]),
        },
    };
    Some(ToolConfig {
        function_calling_config: Some(config),
    })
}

fn map_generation_config(
    request: &ChatCompletionRequest,
    image_output: bool,
) -> Option<GenerationConfig> {
    let mut config = GenerationConfig {
        temperature: request.temperature,
        top_p: request.top_p,
        max_output_tokens: request.completion_budget(),
        candidate_count: request.n,
        stop_sequences: request
            .stop
            .clone()
            .map(StopConfigurationExt::into_trimmed)
            .filter(|sequences| !sequences.is_empty()),
        seed: request.seed,
        frequency_penalty: request.frequency_penalty,
        presence_penalty: request.presence_penalty,
        response_mime_type: None,
        response_schema: None,
        response_modalities: None,
    };

    match &request.response_format {
        Some(ResponseFormat::JsonSchema { json_schema }) => {
            config.response_mime_type = Some("application/json".to_string());
            config.response_schema = json_schema.schema.as_ref().map(sanitize_schema);
        }
        Some(ResponseFormat::JsonObject) => {
            config.response_mime_type = Some("application/json".to_string());
        }
        Some(ResponseFormat::Text) | None => {}
    }

    if image_output {
        config.response_modalities = Some(vec!["TEXT".to_string(), "IMAGE".to_string()]);
    }

    (config != GenerationConfig::default()).then_some(config)
}

trait StopConfigurationExt {
    fn into_trimmed(self) -> Vec<String>;
}

impl StopConfigurationExt for aar_protocol::openai::chat::types::StopConfiguration {
    fn into_trimmed(self) -> Vec<String> {
        self.into_sequences()
            .into_iter()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aar_protocol::openai::chat::types::{
        FunctionDefinition, JsonSchemaFormat, NamedToolChoice, NamedToolChoiceFunction,
        NamedToolChoiceType, SystemMessage, ToolCallFunction,
    };
    use serde_json::json;

    fn base_request(messages: Vec<RequestMessage>) -> ChatCompletionRequest {
        ChatCompletionRequest {
            messages,
            model: "gemini-2.5-flash".to_string(),
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

    fn user(text: &str) -> RequestMessage {
        RequestMessage::User(UserMessage {
            content: UserContent::Text(text.to_string()),
            name: None,
        })
    }

    #[test]
    fn system_goes_to_system_instruction() {
        let request = base_request(vec![
            RequestMessage::System(SystemMessage {
                content: "be terse".to_string(),
                name: None,
            }),
            user("hi"),
        ]);
        let out = adapt_chat_request(&request, false).unwrap();
        let instruction = out.system_instruction.unwrap();
        assert_eq!(instruction.parts[0].text.as_deref(), Some("be terse"));
        assert_eq!(out.contents.len(), 1);
        assert_eq!(out.contents[0].role, Some(ContentRole::User));
    }

    #[test]
    fn assistant_role_maps_to_model() {
        let request = base_request(vec![
            user("hi"),
            RequestMessage::Assistant(AssistantMessage {
                content: Some("hello".to_string()),
                name: None,
                tool_calls: None,
            }),
        ]);
        let out = adapt_chat_request(&request, false).unwrap();
        assert_eq!(out.contents[1].role, Some(ContentRole::Model));
    }

    #[test]
    fn tool_result_names_resolve_from_prior_calls() {
        let request = base_request(vec![
            user("weather?"),
            RequestMessage::Assistant(AssistantMessage {
                content: None,
                name: None,
                tool_calls: Some(vec![ToolCall::Function {
                    id: "call_0".to_string(),
                    function: ToolCallFunction {
                        name: "get_weather".to_string(),
                        arguments: "{\"city\":\"Tokyo\"}".to_string(),
                    },
                }]),
            }),
            RequestMessage::Tool(ToolMessage {
                content: "{\"temp_c\":21}".to_string(),
                tool_call_id: "call_0".to_string(),
            }),
        ]);
        let out = adapt_chat_request(&request, false).unwrap();

        let call_part = &out.contents[1].parts[0];
        let call = call_part.function_call.as_ref().unwrap();
        assert_eq!(call.name, "get_weather");
        assert_eq!(call.args.as_ref().unwrap()["city"], "Tokyo");

        let response_part = &out.contents[2].parts[0];
        let response = response_part.function_response.as_ref().unwrap();
        assert_eq!(response.name, "get_weather");
        assert_eq!(out.contents[2].role, Some(ContentRole::User));
    }

    #[test]
    fn sampling_knobs_land_in_generation_config() {
        let mut request = base_request(vec![user("hi")]);
        request.temperature = Some(0.4);
        request.top_p = Some(0.9);
        request.max_tokens = Some(256);
        request.seed = Some(7);
        request.stop = Some(aar_protocol::openai::chat::types::StopConfiguration::Single(
            "END".to_string(),
        ));

        let out = adapt_chat_request(&request, false).unwrap();
        let config = out.generation_config.unwrap();
        assert_eq!(config.temperature, Some(0.4));
        assert_eq!(config.top_p, Some(0.9));
        assert_eq!(config.max_output_tokens, Some(256));
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.stop_sequences, Some(vec!["END".to_string()]));
    }

    #[test]
    fn json_schema_response_format_sets_mime_and_schema() {
        let mut request = base_request(vec![user("hi")]);
        request.response_format = Some(ResponseFormat::JsonSchema {
            json_schema: JsonSchemaFormat {
                name: "weather".to_string(),
                description: None,
                schema: Some(json!({
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {"city": {"$ref": "#/$defs/City"}},
                    "$defs": {"City": {"type": "string"}}
                })),
                strict: Some(true),
            },
        });

        let out = adapt_chat_request(&request, false).unwrap();
        let config = out.generation_config.unwrap();
        assert_eq!(config.response_mime_type.as_deref(), Some("application/json"));
        let schema = config.response_schema.unwrap();
        assert!(schema.get("additionalProperties").is_none());
        assert!(schema.get("$defs").is_none());
        assert_eq!(schema["properties"]["city"]["type"], "string");
    }

    #[test]
    fn tool_choice_maps_to_function_calling_config() {
        let mut request = base_request(vec![user("hi")]);
        request.tools = Some(vec![ToolDefinition::Function {
            function: FunctionDefinition {
                name: "get_weather".to_string(),
                description: None,
                parameters: Some(json!({"type": "object"})),
                strict: None,
            },
        }]);

        request.tool_choice = Some(ToolChoice::Mode(ToolChoiceMode::Required));
        let out = adapt_chat_request(&request, false).unwrap();
        let config = out
            .tool_config
            .unwrap()
            .function_calling_config
            .unwrap();
        assert_eq!(config.mode, Some(FunctionCallingMode::Any));

        request.tool_choice = Some(ToolChoice::Named(NamedToolChoice {
            r#type: NamedToolChoiceType::Function,
            function: NamedToolChoiceFunction {
                name: "get_weather".to_string(),
            },
        }));
        let out = adapt_chat_request(&request, false).unwrap();
        let config = out
            .tool_config
            .unwrap()
            .function_calling_config
            .unwrap();
        assert_eq!(config.mode, Some(FunctionCallingMode::Any));
        assert_eq!(
            config.allowed_function_names,
            Some(vec!["get_weather".to_string()])
        );
    }

    #[test]
    fn image_output_requests_image_modality() {
        let out = adapt_chat_request(&base_request(vec![user("draw a cat")]), true).unwrap();
        let config = out.generation_config.unwrap();
        assert_eq!(
            config.response_modalities,
            Some(vec!["TEXT".to_string(), "IMAGE".to_string()])
        );
    }

    #[test]
    fn image_parts_map_to_inline_and_file_data() {
        let request = base_request(vec![RequestMessage::User(UserMessage {
            content: UserContent::Parts(vec![
                UserContentPart::Text {
                    text: "what painting?".to_string(),
                },
                UserContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: "https://example.com/Starry_Night.jpg".to_string(),
                        detail: None,
                    },
                },
                UserContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: "data:image/png;base64,Zm9v".to_string(),
                        detail: None,
                    },
                },
            ]),
            name: None,
        })]);

        let out = adapt_chat_request(&request, false).unwrap();
        let parts = &out.contents[0].parts;
        let file = parts[1].file_data.as_ref().unwrap();
        assert_eq!(file.file_uri, "https://example.com/Starry_Night.jpg");
        assert_eq!(file.mime_type.as_deref(), Some("image/jpeg"));
        let inline = parts[2].inline_data.as_ref().unwrap();
        assert_eq!(inline.mime_type, "image/png");
        assert_eq!(inline.data, "Zm9v");
    }
}
