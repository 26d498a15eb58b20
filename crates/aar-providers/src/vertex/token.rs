//! Service-account access-token exchange.
//!
//! A signed RS256 assertion is traded at the credential's token endpoint for
//! a bearer token, cached per client_email until shortly before expiry.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::Mutex;

use aar_pool::ServiceAccountCredential;

use crate::errors::{ProviderError, ProviderResult};

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
/// Refresh this many seconds before the token actually expires.
const EXPIRY_SLACK_SECS: i64 = 60;

#[derive(Debug, Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    exp: i64,
    iat: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: i64,
}

pub struct VertexTokenProvider {
    client: wreq::Client,
    cache: Mutex<HashMap<String, CachedToken>>,
}

impl VertexTokenProvider {
    pub fn new(client: wreq::Client) -> Self {
        Self {
            client,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn access_token(
        &self,
        credential: &ServiceAccountCredential,
    ) -> ProviderResult<String> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        {
            let cache = self.cache.lock().await;
            if let Some(cached) = cache.get(&credential.client_email)
                && now + EXPIRY_SLACK_SECS < cached.expires_at
            {
                return Ok(cached.access_token.clone());
            }
        }

        let token = self.exchange(credential, now).await?;
        let mut cache = self.cache.lock().await;
        cache.insert(credential.client_email.clone(), token.clone());
        Ok(token.access_token)
    }

    /// Drop a cached token after an upstream auth failure so the next
    /// attempt re-exchanges.
    pub async fn invalidate(&self, credential: &ServiceAccountCredential) {
        self.cache.lock().await.remove(&credential.client_email);
    }

    async fn exchange(
        &self,
        credential: &ServiceAccountCredential,
        now: i64,
    ) -> ProviderResult<CachedToken> {
        use jsonwebtoken::{Algorithm, EncodingKey, Header};

        let token_uri = credential.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
        let exp = now + 3600;
        let claims = JwtClaims {
            iss: &credential.client_email,
            scope: SCOPE,
            aud: token_uri,
            exp,
            iat: now,
        };
        let mut header = Header::new(Algorithm::RS256);
        if !credential.private_key_id.trim().is_empty() {
            header.kid = Some(credential.private_key_id.clone());
        }
        let key = EncodingKey::from_rsa_pem(credential.private_key.as_bytes())
            .map_err(|err| ProviderError::TokenExchange(err.to_string()))?;
        let assertion = jsonwebtoken::encode(&header, &claims, &key)
            .map_err(|err| ProviderError::TokenExchange(err.to_string()))?;

        let body = format!(
            "grant_type=urn:ietf:params:oauth:grant-type:jwt-bearer&assertion={}",
            urlencoding::encode(&assertion)
        );
        let response = self
            .client
            .post(token_uri)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|err| ProviderError::TokenExchange(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::TokenExchange(format!(
                "{status}: {text}"
            )));
        }

        let payload = response
            .bytes()
            .await
            .map_err(|err| ProviderError::TokenExchange(err.to_string()))?;
        let token: TokenResponse = serde_json::from_slice(&payload)
            .map_err(|err| ProviderError::TokenExchange(err.to_string()))?;

        tracing::debug!(
            client_email = %credential.client_email,
            "exchanged service-account assertion for access token"
        );
        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: now + token.expires_in.unwrap_or(3600),
        })
    }
}
