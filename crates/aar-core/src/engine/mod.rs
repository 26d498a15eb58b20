mod stream;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use aar_common::GatewayError;
use aar_pool::{BanReason, Credential, CredentialPool, ModelBinding, ModelTable, PickError, Provider};
use aar_protocol::anthropic::messages::request::CreateMessageRequest;
use aar_protocol::anthropic::messages::response::Message as AnthropicMessage;
use aar_protocol::gemini::generate_content::request::GenerateContentRequest;
use aar_protocol::gemini::generate_content::response::GenerateContentResponse;
use aar_protocol::gemini::predict::{EmbeddingPredictRequest, ImagenPredictRequest, PredictResponse};
use aar_protocol::openai::chat::request::ChatCompletionRequest;
use aar_protocol::openai::chat::response::ChatCompletionResponse;
use aar_protocol::openai::embeddings::EmbeddingsRequest;
use aar_protocol::openai::embeddings::EmbeddingsResponse;
use aar_protocol::openai::images::{ImageGenerationRequest, ImageGenerationResponse};
use aar_providers::{ProviderError, UpstreamRequest, VertexTokenProvider};
use aar_transform::TransformError;

use crate::client::{ByteStream, TransportErrorKind, UpstreamBody, UpstreamClient, UpstreamFailure};
use crate::failure;
use crate::metrics::GatewayMetrics;

/// Attempt budget for retryable upstream failures.
const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub request_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Framed SSE bytes ready for the client socket. The channel ends after the
/// `data: [DONE]` frame, or earlier on abnormal termination (no `[DONE]`).
pub struct SseStream {
    pub receiver: mpsc::Receiver<Bytes>,
}

/// Provider-adapted request body, ready to be bound to a credential.
enum Prepared {
    OpenAiChat(ChatCompletionRequest),
    OpenAiEmbeddings(EmbeddingsRequest),
    OpenAiImages(ImageGenerationRequest),
    AnthropicMessages(CreateMessageRequest),
    VertexChat {
        model: String,
        body: GenerateContentRequest,
        stream: bool,
    },
    VertexImagen {
        model: String,
        body: ImagenPredictRequest,
    },
    VertexEmbeddings {
        model: String,
        body: EmbeddingPredictRequest,
    },
}

pub struct Engine {
    pool: Arc<CredentialPool>,
    models: Arc<ModelTable>,
    client: Arc<dyn UpstreamClient>,
    tokens: Arc<VertexTokenProvider>,
    metrics: Arc<GatewayMetrics>,
    request_timeout: Duration,
}

impl Engine {
    pub fn new(
        pool: Arc<CredentialPool>,
        models: Arc<ModelTable>,
        client: Arc<dyn UpstreamClient>,
        tokens: Arc<VertexTokenProvider>,
        metrics: Arc<GatewayMetrics>,
        config: EngineConfig,
    ) -> Self {
        Self {
            pool,
            models,
            client,
            tokens,
            metrics,
            request_timeout: config.request_timeout,
        }
    }

    pub fn models(&self) -> &ModelTable {
        &self.models
    }

    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    pub fn metrics(&self) -> &GatewayMetrics {
        &self.metrics
    }

    pub async fn chat(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, GatewayError> {
        let alias = request.model.clone();
        let binding = self.chat_binding(&alias)?;
        let provider = binding.provider;
        let created = unix_now();
        self.count_request("chat_completions", provider);

        let prepared = match provider {
            Provider::OpenAi => Prepared::OpenAiChat(aar_transform::openai::adapt_chat_request(
                request,
                &binding.upstream_model,
            )),
            Provider::Anthropic => Prepared::AnthropicMessages(
                aar_transform::anthropic::adapt_chat_request(&request, &binding.upstream_model)
                    .map_err(adapter_error)?,
            ),
            Provider::Vertex => Prepared::VertexChat {
                model: binding.upstream_model.clone(),
                body: aar_transform::vertex::adapt_chat_request(
                    &request,
                    binding.capabilities.image_output,
                )
                .map_err(adapter_error)?,
                stream: false,
            },
        };

        let body = self.dispatch(&alias, &prepared).await?;
        let response = match provider {
            Provider::OpenAi => {
                let native: ChatCompletionResponse = decode(&body)?;
                aar_transform::openai::adapt_chat_response(native, &alias)
            }
            Provider::Anthropic => {
                let native: AnthropicMessage = decode(&body)?;
                aar_transform::anthropic::adapt_chat_response(native, &alias, created)
            }
            Provider::Vertex => {
                let native: GenerateContentResponse = decode(&body)?;
                aar_transform::vertex::adapt_chat_response(native, &alias, created)
                    .map_err(adapter_error)?
            }
        };

        if let Some(usage) = &response.usage {
            self.metrics.record_usage(usage);
        }
        Ok(response)
    }

    pub async fn chat_stream(
        &self,
        mut request: ChatCompletionRequest,
    ) -> Result<SseStream, GatewayError> {
        let alias = request.model.clone();
        let binding = self.chat_binding(&alias)?;
        if !binding.capabilities.streaming {
            return Err(GatewayError::Adapter(format!(
                "model `{alias}` does not support streaming"
            )));
        }
        let provider = binding.provider;
        let created = unix_now();
        let include_usage = request.include_usage();
        self.count_request("chat_completions", provider);

        request.stream = Some(true);
        let prepared = match provider {
            Provider::OpenAi => Prepared::OpenAiChat(aar_transform::openai::adapt_chat_request(
                request,
                &binding.upstream_model,
            )),
            Provider::Anthropic => Prepared::AnthropicMessages(
                aar_transform::anthropic::adapt_chat_request(&request, &binding.upstream_model)
                    .map_err(adapter_error)?,
            ),
            Provider::Vertex => Prepared::VertexChat {
                model: binding.upstream_model.clone(),
                body: aar_transform::vertex::adapt_chat_request(
                    &request,
                    binding.capabilities.image_output,
                )
                .map_err(adapter_error)?,
                stream: true,
            },
        };

        let upstream = self.dispatch_stream(&alias, &prepared).await?;
        let receiver = match provider {
            Provider::OpenAi => {
                stream::spawn_openai_pump(upstream, alias.clone(), self.metrics.clone())
            }
            Provider::Anthropic => stream::spawn_anthropic_pump(
                upstream,
                aar_transform::anthropic::AnthropicStreamAdapter::new(
                    alias.clone(),
                    created,
                    include_usage,
                ),
                self.metrics.clone(),
            ),
            Provider::Vertex => stream::spawn_vertex_pump(
                upstream,
                aar_transform::vertex::VertexStreamAdapter::new(
                    alias.clone(),
                    created,
                    include_usage,
                ),
                self.metrics.clone(),
            ),
        };
        Ok(SseStream { receiver })
    }

    pub async fn embeddings(
        &self,
        request: EmbeddingsRequest,
    ) -> Result<EmbeddingsResponse, GatewayError> {
        let alias = request.model.clone();
        let binding = self.binding(&alias)?;
        if !binding.capabilities.embedding {
            return Err(GatewayError::Adapter(format!(
                "model `{alias}` is not an embedding model"
            )));
        }
        let provider = binding.provider;
        self.count_request("embeddings", provider);

        let prepared = match provider {
            Provider::OpenAi => Prepared::OpenAiEmbeddings(
                aar_transform::openai::adapt_embeddings_request(request, &binding.upstream_model),
            ),
            Provider::Vertex => Prepared::VertexEmbeddings {
                model: binding.upstream_model.clone(),
                body: aar_transform::vertex::adapt_embeddings_request(&request),
            },
            Provider::Anthropic => {
                return Err(GatewayError::Adapter(
                    "anthropic models do not support embeddings".to_string(),
                ));
            }
        };

        let body = self.dispatch(&alias, &prepared).await?;
        let response = match provider {
            Provider::OpenAi => {
                let native: EmbeddingsResponse = decode(&body)?;
                aar_transform::openai::adapt_embeddings_response(native, &alias)
            }
            Provider::Vertex => {
                let native: PredictResponse = decode(&body)?;
                aar_transform::vertex::adapt_embeddings_response(native, &alias)
                    .map_err(adapter_error)?
            }
            Provider::Anthropic => unreachable!("rejected above"),
        };

        self.metrics.record_usage(&response.usage);
        Ok(response)
    }

    pub async fn images(
        &self,
        request: ImageGenerationRequest,
    ) -> Result<ImageGenerationResponse, GatewayError> {
        let Some(alias) = request.model.clone() else {
            return Err(GatewayError::Adapter(
                "`model` is required for image generation".to_string(),
            ));
        };
        let binding = self.binding(&alias)?;
        if !binding.capabilities.image_generation {
            return Err(GatewayError::Adapter(format!(
                "model `{alias}` is not an image generation model"
            )));
        }
        let provider = binding.provider;
        let created = unix_now();
        self.count_request("images_generations", provider);

        let prepared = match provider {
            Provider::OpenAi => {
                let mut passthrough = request;
                passthrough.model = Some(binding.upstream_model.clone());
                Prepared::OpenAiImages(passthrough)
            }
            Provider::Vertex => Prepared::VertexImagen {
                model: binding.upstream_model.clone(),
                body: aar_transform::vertex::adapt_image_request(&request),
            },
            Provider::Anthropic => {
                return Err(GatewayError::Adapter(
                    "anthropic models do not support image generation".to_string(),
                ));
            }
        };

        let body = self.dispatch(&alias, &prepared).await?;
        match provider {
            Provider::OpenAi => decode(&body),
            Provider::Vertex => {
                let native: PredictResponse = decode(&body)?;
                aar_transform::vertex::adapt_image_response(native, created)
                    .map_err(adapter_error)
            }
            Provider::Anthropic => unreachable!("rejected above"),
        }
    }

    fn binding(&self, alias: &str) -> Result<ModelBinding, GatewayError> {
        self.models
            .resolve(alias)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownModel(alias.to_string()))
    }

    fn chat_binding(&self, alias: &str) -> Result<ModelBinding, GatewayError> {
        let binding = self.binding(alias)?;
        if binding.capabilities.embedding {
            return Err(GatewayError::Adapter(format!(
                "model `{alias}` is an embedding model; use /v1/embeddings"
            )));
        }
        if binding.capabilities.image_generation {
            return Err(GatewayError::Adapter(format!(
                "model `{alias}` is an image model; use /v1/images/generations"
            )));
        }
        Ok(binding)
    }

    fn count_request(&self, endpoint: &str, provider: Provider) {
        self.metrics
            .requests
            .with_label_values(&[endpoint, provider.as_str()])
            .inc();
    }

    async fn build_request(
        &self,
        prepared: &Prepared,
        credential: &Credential,
    ) -> Result<UpstreamRequest, ProviderError> {
        match (prepared, credential) {
            (Prepared::OpenAiChat(body), Credential::OpenAi(key)) => {
                aar_providers::openai::chat_request(key, body)
            }
            (Prepared::OpenAiEmbeddings(body), Credential::OpenAi(key)) => {
                aar_providers::openai::embeddings_request(key, body)
            }
            (Prepared::OpenAiImages(body), Credential::OpenAi(key)) => {
                aar_providers::openai::image_request(key, body)
            }
            (Prepared::AnthropicMessages(body), Credential::Anthropic(key)) => {
                aar_providers::anthropic::messages_request(key, body)
            }
            (Prepared::VertexChat { model, body, stream }, Credential::Vertex(account)) => {
                aar_providers::vertex::chat_request(&self.tokens, account, model, body, *stream)
                    .await
            }
            (Prepared::VertexImagen { model, body }, Credential::Vertex(account)) => {
                aar_providers::vertex::predict_request(&self.tokens, account, model, body).await
            }
            (Prepared::VertexEmbeddings { model, body }, Credential::Vertex(account)) => {
                aar_providers::vertex::predict_request(&self.tokens, account, model, body).await
            }
            _ => Err(ProviderError::InvalidCredential(
                "credential does not match the model's provider",
            )),
        }
    }

    /// Attempt loop for non-streaming calls; returns the 2xx body.
    async fn dispatch(&self, alias: &str, prepared: &Prepared) -> Result<Bytes, GatewayError> {
        match self.attempt_loop(alias, prepared).await? {
            UpstreamBody::Bytes(body) => Ok(body),
            UpstreamBody::Stream(mut receiver) => {
                // Defensive: a non-streaming call never asks for a stream.
                let mut collected = Vec::new();
                while let Some(Ok(chunk)) = receiver.recv().await {
                    collected.extend_from_slice(&chunk);
                }
                Ok(Bytes::from(collected))
            }
        }
    }

    /// Attempt loop for streaming calls; returns the raw upstream byte
    /// stream once a 2xx response is open. No client bytes have been sent
    /// yet at any retry point.
    async fn dispatch_stream(
        &self,
        alias: &str,
        prepared: &Prepared,
    ) -> Result<ByteStream, GatewayError> {
        match self.attempt_loop(alias, prepared).await? {
            UpstreamBody::Stream(receiver) => Ok(receiver),
            UpstreamBody::Bytes(body) => {
                // Upstream answered without streaming; forward it as one chunk.
                let (tx, rx) = mpsc::channel(1);
                let _ = tx.try_send(Ok(body));
                Ok(rx)
            }
        }
    }

    async fn attempt_loop(
        &self,
        alias: &str,
        prepared: &Prepared,
    ) -> Result<UpstreamBody, GatewayError> {
        let mut last_error: Option<GatewayError> = None;

        for attempt in 1..=MAX_ATTEMPTS {
            let (cred_id, credential) = match self.pool.pick(alias).await {
                Ok(pair) => pair,
                Err(PickError::UnknownModel) => {
                    return Err(GatewayError::UnknownModel(alias.to_string()));
                }
                Err(PickError::NoEligibleCredential) => {
                    // Mid-loop exhaustion surfaces the failure that banned
                    // the last credential, if any.
                    return Err(last_error
                        .unwrap_or_else(|| GatewayError::NoEligibleCredential(alias.to_string())));
                }
            };

            let upstream_request = match self.build_request(prepared, &credential).await {
                Ok(request) => request,
                Err(ProviderError::TokenExchange(message)) => {
                    tracing::warn!(credential_id = cred_id, %message, "token exchange failed");
                    self.ban(cred_id, failure::BanDecision {
                        duration: Duration::from_secs(3600),
                        reason: BanReason::Auth,
                    })
                    .await;
                    last_error = Some(GatewayError::UpstreamTransient {
                        status: None,
                        message,
                    });
                    continue;
                }
                Err(err) => return Err(GatewayError::Internal(err.to_string())),
            };

            let outcome =
                tokio::time::timeout(self.request_timeout, self.client.send(upstream_request))
                    .await;
            let upstream_failure = match outcome {
                Err(_) => UpstreamFailure::Transport {
                    kind: TransportErrorKind::Timeout,
                    message: "upstream request timed out".to_string(),
                },
                Ok(Err(transport)) => transport,
                Ok(Ok(response)) if (200..300).contains(&response.status) => {
                    self.pool.report_success(cred_id).await;
                    return Ok(response.body);
                }
                Ok(Ok(response)) => {
                    let body = match response.body {
                        UpstreamBody::Bytes(body) => body,
                        UpstreamBody::Stream(_) => Bytes::new(),
                    };
                    UpstreamFailure::Http {
                        status: response.status,
                        headers: response.headers,
                        body,
                    }
                }
            };

            // A 401/403 on Vertex may be a stale cached access token; drop
            // it so the next attempt re-exchanges.
            if let UpstreamFailure::Http {
                status: 401 | 403, ..
            } = &upstream_failure
                && let Credential::Vertex(account) = &credential
            {
                self.tokens.invalidate(account).await;
            }

            let attempt_count = self.pool.attempt_count(cred_id).await;
            if let Some(decision) = failure::decide_ban(&upstream_failure, attempt_count) {
                self.ban(cred_id, decision).await;
            }

            let error = failure_to_error(&upstream_failure);
            if !failure::is_retryable(&upstream_failure) {
                return Err(error);
            }
            tracing::debug!(
                alias,
                attempt,
                credential_id = cred_id,
                error = %error,
                "retryable upstream failure"
            );
            last_error = Some(error);
        }

        Err(last_error
            .unwrap_or_else(|| GatewayError::Internal("retry budget exhausted".to_string())))
    }

    async fn ban(&self, cred_id: i64, decision: failure::BanDecision) {
        self.pool
            .mark_banned(cred_id, decision.duration, decision.reason)
            .await;
        self.metrics
            .bans
            .with_label_values(&[reason_label(decision.reason)])
            .inc();
    }
}

fn failure_to_error(failure: &UpstreamFailure) -> GatewayError {
    match failure {
        UpstreamFailure::Transport {
            kind: TransportErrorKind::Timeout,
            ..
        } => GatewayError::Timeout,
        UpstreamFailure::Transport { message, .. } => GatewayError::UpstreamTransient {
            status: None,
            message: message.clone(),
        },
        UpstreamFailure::Http { status, body, .. } => {
            let message = failure::upstream_message(*status, body);
            if *status == 429 || (500..600).contains(status) {
                GatewayError::UpstreamTransient {
                    status: Some(*status),
                    message,
                }
            } else {
                GatewayError::UpstreamPermanent {
                    status: *status,
                    message,
                }
            }
        }
    }
}

fn adapter_error(err: TransformError) -> GatewayError {
    match err {
        TransformError::Unsupported(_) | TransformError::InvalidRequest(_) => {
            GatewayError::Adapter(err.to_string())
        }
        TransformError::InvalidUpstream(_) | TransformError::UpstreamStream(_) => {
            GatewayError::Internal(err.to_string())
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, GatewayError> {
    serde_json::from_slice(body).map_err(|err| {
        GatewayError::Internal(format!("failed to decode upstream response: {err}"))
    })
}

fn reason_label(reason: BanReason) -> &'static str {
    match reason {
        BanReason::RateLimit => "rate_limit",
        BanReason::Auth => "auth",
        BanReason::ServerError => "server_error",
        BanReason::Quota => "quota",
    }
}

fn unix_now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}
