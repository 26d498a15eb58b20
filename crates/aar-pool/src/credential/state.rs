use serde::{Deserialize, Serialize};
use tokio::time::Instant;

pub type CredentialId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BanReason {
    RateLimit,
    Auth,
    ServerError,
    Quota,
}

#[derive(Debug, Clone)]
pub enum CredentialState {
    Active,
    Banned { until: Instant, reason: BanReason },
}

impl CredentialState {
    pub fn is_active(&self) -> bool {
        matches!(self, CredentialState::Active)
    }

    /// Whether a ban is still in force at `now`.
    pub fn is_banned_at(&self, now: Instant) -> bool {
        match self {
            CredentialState::Banned { until, .. } => *until > now,
            CredentialState::Active => false,
        }
    }
}
