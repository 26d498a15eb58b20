use std::error::Error;
use std::fmt;

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Clone)]
pub enum ProviderError {
    InvalidCredential(&'static str),
    Serialize(String),
    /// Token exchange with the provider's OAuth endpoint failed.
    TokenExchange(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::InvalidCredential(what) => {
                write!(f, "credential does not fit provider: {what}")
            }
            ProviderError::Serialize(msg) => write!(f, "failed to serialize body: {msg}"),
            ProviderError::TokenExchange(msg) => write!(f, "token exchange failed: {msg}"),
        }
    }
}

impl Error for ProviderError {}
