use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    120
}

fn default_stream_idle_timeout() -> u64 {
    90
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Clients authenticate with `Authorization: Bearer <master_key>`.
    pub master_key: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_stream_idle_timeout")]
    pub stream_idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiKeyConfig {
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Model aliases this key may serve.
    pub models: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicKeyConfig {
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub models: Vec<String>,
}

/// Google service-account material plus Vertex routing context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VertexCredentialConfig {
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub models: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: Vec<OpenAiKeyConfig>,
    #[serde(default)]
    pub anthropic: Vec<AnthropicKeyConfig>,
    #[serde(default)]
    pub vertex: Vec<VertexCredentialConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Client-facing alias.
    pub id: String,
    /// `openai` | `anthropic` | `vertex`.
    pub provider: String,
    /// Upstream model id; defaults to the alias.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_model: Option<String>,
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub tools: bool,
    #[serde(default)]
    pub vision: bool,
    #[serde(default)]
    pub image_generation: bool,
    #[serde(default)]
    pub embedding: bool,
    /// Chat model that can emit inline images (e.g. gemini image models).
    #[serde(default)]
    pub image_output: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

impl GatewayConfig {
    pub fn from_yaml(document: &str) -> Result<Self, ConfigError> {
        let config: GatewayConfig = serde_yaml::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let document = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_yaml(&document)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.master_key.trim().is_empty() {
            return Err(ConfigError::Invalid("server.master_key is empty".to_string()));
        }
        for model in &self.models {
            match model.provider.as_str() {
                "openai" | "anthropic" | "vertex" => {}
                other => {
                    return Err(ConfigError::Invalid(format!(
                        "model {}: unknown provider `{other}`",
                        model.id
                    )));
                }
            }
        }
        let mut seen = std::collections::HashSet::new();
        for model in &self.models {
            if !seen.insert(model.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate model id `{}`",
                    model.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
server:
  master_key: sk-test
providers:
  openai:
    - api_key: sk-upstream
      models: [gpt-4o-mini]
models:
  - id: gpt-4o-mini
    provider: openai
    streaming: true
    tools: true
"#;

    #[test]
    fn parses_minimal_document() {
        let config = GatewayConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.providers.openai.len(), 1);
        assert_eq!(config.models[0].id, "gpt-4o-mini");
        assert!(config.models[0].streaming);
        assert!(!config.models[0].embedding);
    }

    #[test]
    fn rejects_unknown_provider() {
        let doc = SAMPLE.replace("provider: openai", "provider: bedrock");
        assert!(GatewayConfig::from_yaml(&doc).is_err());
    }

    #[test]
    fn rejects_duplicate_model_ids() {
        let doc = format!(
            "{SAMPLE}  - id: gpt-4o-mini\n    provider: openai\n"
        );
        assert!(GatewayConfig::from_yaml(&doc).is_err());
    }
}
