use aar_protocol::openai::error::ErrorBody;
use thiserror::Error;

/// Gateway-level failures, each with a fixed HTTP mapping and an
/// OpenAI-shaped body.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("invalid api key")]
    InvalidAuth,
    #[error("model not found: {0}")]
    UnknownModel(String),
    #[error("no eligible credential for model {0}")]
    NoEligibleCredential(String),
    /// Retryable upstream failure (429, 5xx, transport) after the attempt
    /// budget is exhausted.
    #[error("upstream error: {message}")]
    UpstreamTransient {
        status: Option<u16>,
        message: String,
    },
    /// Non-retryable upstream failure; the upstream status is preserved.
    #[error("upstream error: {message}")]
    UpstreamPermanent { status: u16, message: String },
    #[error("request cannot be adapted: {0}")]
    Adapter(String),
    #[error("request timed out")]
    Timeout,
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> u16 {
        match self {
            GatewayError::InvalidAuth => 401,
            GatewayError::UnknownModel(_) => 404,
            GatewayError::NoEligibleCredential(_) => 503,
            GatewayError::UpstreamTransient { status, .. } => match status {
                // 429 passes through so clients can honor their own backoff.
                Some(429) => 429,
                _ => 502,
            },
            GatewayError::UpstreamPermanent { status, .. } => *status,
            GatewayError::Adapter(_) => 400,
            GatewayError::Timeout => 504,
            GatewayError::Internal(_) => 500,
        }
    }

    pub fn body(&self) -> ErrorBody {
        match self {
            GatewayError::InvalidAuth => ErrorBody::new(
                "Invalid API key provided.",
                "invalid_request_error",
                Some("invalid_api_key"),
            ),
            GatewayError::UnknownModel(model) => ErrorBody::new(
                format!("The model `{model}` does not exist or is not configured."),
                "invalid_request_error",
                Some("model_not_found"),
            ),
            GatewayError::NoEligibleCredential(model) => ErrorBody::new(
                format!("No credentials are currently available for model `{model}`."),
                "service_unavailable_error",
                Some("no_credentials_available"),
            ),
            GatewayError::UpstreamTransient { message, .. } => {
                ErrorBody::new(message.clone(), "upstream_error", Some("upstream_transient"))
            }
            GatewayError::UpstreamPermanent { message, .. } => {
                ErrorBody::new(message.clone(), "upstream_error", None)
            }
            GatewayError::Adapter(message) => {
                ErrorBody::new(message.clone(), "invalid_request_error", None)
            }
            GatewayError::Timeout => ErrorBody::new(
                "The upstream request timed out.",
                "timeout_error",
                Some("upstream_timeout"),
            ),
            GatewayError::Internal(message) => {
                ErrorBody::new(message.clone(), "internal_error", None)
            }
        }
    }
}
