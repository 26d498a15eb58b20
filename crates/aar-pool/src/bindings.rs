use std::collections::HashMap;

use aar_common::config::ModelConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenAi,
    Anthropic,
    Vertex,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Vertex => "vertex",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "openai" => Some(Provider::OpenAi),
            "anthropic" => Some(Provider::Anthropic),
            "vertex" => Some(Provider::Vertex),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelCapabilities {
    pub streaming: bool,
    pub tools: bool,
    pub vision: bool,
    pub image_generation: bool,
    pub embedding: bool,
    pub image_output: bool,
}

#[derive(Debug, Clone)]
pub struct ModelBinding {
    pub provider: Provider,
    /// Provider-native model id the alias rewrites to.
    pub upstream_model: String,
    pub capabilities: ModelCapabilities,
}

/// Static alias table; read-only after startup.
#[derive(Debug, Clone, Default)]
pub struct ModelTable {
    bindings: HashMap<String, ModelBinding>,
    /// Aliases in configuration order, for `/v1/models`.
    order: Vec<String>,
}

impl ModelTable {
    pub fn from_configs(models: &[ModelConfig]) -> Self {
        let mut table = Self::default();
        for model in models {
            let Some(provider) = Provider::parse(&model.provider) else {
                continue;
            };
            table.insert(
                model.id.clone(),
                ModelBinding {
                    provider,
                    upstream_model: model
                        .upstream_model
                        .clone()
                        .unwrap_or_else(|| model.id.clone()),
                    capabilities: ModelCapabilities {
                        streaming: model.streaming,
                        tools: model.tools,
                        vision: model.vision,
                        image_generation: model.image_generation,
                        embedding: model.embedding,
                        image_output: model.image_output,
                    },
                },
            );
        }
        table
    }

    pub fn insert(&mut self, alias: String, binding: ModelBinding) {
        if !self.bindings.contains_key(&alias) {
            self.order.push(alias.clone());
        }
        self.bindings.insert(alias, binding);
    }

    pub fn resolve(&self, alias: &str) -> Option<&ModelBinding> {
        self.bindings.get(alias)
    }

    pub fn aliases(&self) -> impl Iterator<Item = (&str, &ModelBinding)> {
        self.order
            .iter()
            .filter_map(|alias| self.bindings.get(alias).map(|b| (alias.as_str(), b)))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(id: &str, provider: &str) -> ModelConfig {
        ModelConfig {
            id: id.to_string(),
            provider: provider.to_string(),
            upstream_model: None,
            streaming: true,
            tools: false,
            vision: false,
            image_generation: false,
            embedding: false,
            image_output: false,
        }
    }

    #[test]
    fn alias_defaults_to_upstream_model() {
        let table = ModelTable::from_configs(&[model("claude-opus-4-1", "anthropic")]);
        let binding = table.resolve("claude-opus-4-1").unwrap();
        assert_eq!(binding.provider, Provider::Anthropic);
        assert_eq!(binding.upstream_model, "claude-opus-4-1");
    }

    #[test]
    fn aliases_keep_configuration_order() {
        let table = ModelTable::from_configs(&[
            model("a", "openai"),
            model("b", "vertex"),
            model("c", "anthropic"),
        ]);
        let order: Vec<&str> = table.aliases().map(|(alias, _)| alias).collect();
        assert_eq!(order, ["a", "b", "c"]);
    }
}
