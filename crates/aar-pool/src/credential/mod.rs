mod pool;
mod state;
mod unban_queue;

pub use pool::{CredentialPool, PickError, PoolSnapshot};
pub use state::{BanReason, CredentialId, CredentialState};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Credential {
    OpenAi(ApiKeyCredential),
    Anthropic(ApiKeyCredential),
    Vertex(ServiceAccountCredential),
}

impl Credential {
    pub fn provider(&self) -> crate::Provider {
        match self {
            Credential::OpenAi(_) => crate::Provider::OpenAi,
            Credential::Anthropic(_) => crate::Provider::Anthropic,
            Credential::Vertex(_) => crate::Provider::Vertex,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyCredential {
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Google service-account material used by Vertex, plus routing context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAccountCredential {
    pub project_id: String,
    pub location: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}
