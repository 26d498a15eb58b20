use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use aar_common::GatewayConfig;
use aar_core::{Engine, EngineConfig, GatewayMetrics, WreqUpstreamClient};
use aar_pool::{
    ApiKeyCredential, Credential, CredentialPool, ModelTable, ServiceAccountCredential,
};
use aar_providers::VertexTokenProvider;
use aar_server::AppState;

/// Wire the credential pool, model table and engine from the configuration
/// document.
pub async fn build_state(config: &GatewayConfig) -> Result<AppState> {
    let pool = Arc::new(CredentialPool::new());

    for key in &config.providers.openai {
        pool.insert(
            Credential::OpenAi(ApiKeyCredential {
                api_key: key.api_key.clone(),
                base_url: key.base_url.clone(),
            }),
            &key.models,
        )
        .await;
    }
    for key in &config.providers.anthropic {
        pool.insert(
            Credential::Anthropic(ApiKeyCredential {
                api_key: key.api_key.clone(),
                base_url: key.base_url.clone(),
            }),
            &key.models,
        )
        .await;
    }
    for account in &config.providers.vertex {
        pool.insert(
            Credential::Vertex(ServiceAccountCredential {
                project_id: account.project_id.clone(),
                location: account.location.clone().unwrap_or_default(),
                client_email: account.client_email.clone(),
                private_key: account.private_key.clone(),
                private_key_id: account.private_key_id.clone(),
                token_uri: account.token_uri.clone(),
                base_url: account.base_url.clone(),
            }),
            &account.models,
        )
        .await;
    }

    let models = Arc::new(ModelTable::from_configs(&config.models));
    if models.is_empty() {
        tracing::warn!("no models configured; every request will return 404");
    }

    let request_timeout = Duration::from_secs(config.server.request_timeout_secs);
    let stream_idle_timeout = Duration::from_secs(config.server.stream_idle_timeout_secs);
    let client = WreqUpstreamClient::new(Duration::from_secs(5), stream_idle_timeout)
        .context("failed to build upstream HTTP client")?;
    let tokens = Arc::new(VertexTokenProvider::new(client.http_client()));

    let engine = Arc::new(Engine::new(
        pool,
        models,
        Arc::new(client),
        tokens,
        Arc::new(GatewayMetrics::new()),
        EngineConfig { request_timeout },
    ));

    Ok(AppState::new(engine, config.server.master_key.as_str()))
}
