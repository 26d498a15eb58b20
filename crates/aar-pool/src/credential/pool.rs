use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use super::state::{BanReason, CredentialId, CredentialState};
use super::unban_queue::UnbanQueue;
use super::Credential;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickError {
    UnknownModel,
    NoEligibleCredential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub total: usize,
    pub available: usize,
    pub banned: usize,
}

#[derive(Debug, Default)]
struct Rotation {
    /// Recency per credential; `None`-equivalent (missing) sorts first.
    last_used: HashMap<CredentialId, Instant>,
    /// Monotonic pick counter to break exact-instant ties deterministically.
    seq: u64,
    seq_of: HashMap<CredentialId, u64>,
}

pub struct CredentialPool {
    creds: RwLock<HashMap<CredentialId, Credential>>,
    by_model: RwLock<HashMap<String, Vec<CredentialId>>>,
    states: Arc<RwLock<HashMap<CredentialId, CredentialState>>>,
    attempts: RwLock<HashMap<CredentialId, u32>>,
    rotation: Mutex<Rotation>,
    queue: Arc<UnbanQueue>,
    next_id: Mutex<CredentialId>,
}

impl CredentialPool {
    /// Must be created inside a tokio runtime; the unban sweep is spawned
    /// immediately.
    pub fn new() -> Self {
        let states = Arc::new(RwLock::new(HashMap::new()));
        let queue = Arc::new(UnbanQueue::new());
        queue.clone().spawn_sweep(states.clone());
        Self {
            creds: RwLock::new(HashMap::new()),
            by_model: RwLock::new(HashMap::new()),
            states,
            attempts: RwLock::new(HashMap::new()),
            rotation: Mutex::new(Rotation::default()),
            queue,
            next_id: Mutex::new(1),
        }
    }

    /// Register a credential as eligible for the given model aliases.
    pub async fn insert(&self, cred: Credential, models: &[String]) -> CredentialId {
        let id = {
            let mut guard = self.next_id.lock().await;
            let id = *guard;
            *guard += 1;
            id
        };
        self.creds.write().await.insert(id, cred);
        self.states
            .write()
            .await
            .insert(id, CredentialState::Active);
        let mut by_model = self.by_model.write().await;
        for model in models {
            let ids = by_model.entry(model.clone()).or_default();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        id
    }

    /// Select a credential for `model`.
    ///
    /// Expired bans are cleared here (lazy expiry); among the remaining
    /// eligible credentials the least-recently-used wins, which rotates a
    /// healthy pool round-robin and keeps overlapping model sets from
    /// starving a shared credential.
    pub async fn pick(&self, model: &str) -> Result<(CredentialId, Credential), PickError> {
        let ids = {
            let guard = self.by_model.read().await;
            guard.get(model).cloned()
        };
        let Some(ids) = ids else {
            return Err(PickError::UnknownModel);
        };

        let now = Instant::now();
        let chosen = {
            let mut states = self.states.write().await;
            for id in &ids {
                let expired = matches!(
                    states.get(id),
                    Some(CredentialState::Banned { until, .. }) if *until <= now
                );
                if expired {
                    states.insert(*id, CredentialState::Active);
                }
            }

            let mut rotation = self.rotation.lock().await;
            let chosen = ids
                .iter()
                .copied()
                .filter(|id| {
                    states
                        .get(id)
                        .map(CredentialState::is_active)
                        .unwrap_or(false)
                })
                .min_by_key(|id| {
                    (
                        rotation.last_used.get(id).copied(),
                        rotation.seq_of.get(id).copied().unwrap_or(0),
                        *id,
                    )
                });

            if let Some(id) = chosen {
                rotation.seq += 1;
                let seq = rotation.seq;
                rotation.last_used.insert(id, now);
                rotation.seq_of.insert(id, seq);
            }
            chosen
        };

        let Some(id) = chosen else {
            return Err(PickError::NoEligibleCredential);
        };
        let cred = self
            .creds
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(PickError::NoEligibleCredential)?;
        Ok((id, cred))
    }

    /// Exclude a credential from routing until `duration` elapses.
    pub async fn mark_banned(&self, id: CredentialId, duration: Duration, reason: BanReason) {
        let until = Instant::now() + duration;
        self.states
            .write()
            .await
            .insert(id, CredentialState::Banned { until, reason });
        *self.attempts.write().await.entry(id).or_insert(0) += 1;
        self.queue.push(until, id).await;
        tracing::warn!(
            credential_id = id,
            reason = ?reason,
            ban_secs = duration.as_secs(),
            "credential banned"
        );
    }

    /// A 2xx from upstream resets the failure counter and clears any stale ban.
    pub async fn report_success(&self, id: CredentialId) {
        self.attempts.write().await.insert(id, 0);
        let mut states = self.states.write().await;
        if let Some(CredentialState::Banned { .. }) = states.get(&id) {
            states.insert(id, CredentialState::Active);
        }
    }

    /// Consecutive failure count, used to scale retry backoff.
    pub async fn attempt_count(&self, id: CredentialId) -> u32 {
        self.attempts.read().await.get(&id).copied().unwrap_or(0)
    }

    pub async fn state(&self, id: CredentialId) -> Option<CredentialState> {
        self.states.read().await.get(&id).cloned()
    }

    pub async fn snapshot(&self) -> PoolSnapshot {
        let total = self.creds.read().await.len();
        let now = Instant::now();
        let states = self.states.read().await;
        let banned = states
            .values()
            .filter(|state| state.is_banned_at(now))
            .count();
        PoolSnapshot {
            total,
            available: total.saturating_sub(banned),
            banned,
        }
    }
}

impl Default for CredentialPool {
    fn default() -> Self {
        Self::new()
    }
}
