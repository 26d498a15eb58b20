use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify, RwLock};
use tokio::time::{Instant, sleep_until};

use super::state::{CredentialId, CredentialState};

/// Deadline queue driving the background unban sweep. The router also
/// expires bans lazily at pick time, so correctness does not depend on
/// this task's latency.
#[derive(Debug)]
pub(super) struct UnbanQueue {
    heap: Mutex<BinaryHeap<Reverse<(Instant, CredentialId)>>>,
    notify: Notify,
}

impl UnbanQueue {
    pub(super) fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
        }
    }

    pub(super) async fn push(&self, until: Instant, credential_id: CredentialId) {
        {
            let mut heap = self.heap.lock().await;
            heap.push(Reverse((until, credential_id)));
        }
        // Always notify; the sweep re-computes the next deadline.
        self.notify.notify_one();
    }

    pub(super) fn spawn_sweep(
        self: Arc<Self>,
        states: Arc<RwLock<HashMap<CredentialId, CredentialState>>>,
    ) {
        tokio::spawn(async move {
            loop {
                let next = {
                    let heap = self.heap.lock().await;
                    heap.peek().map(|Reverse((deadline, _))| *deadline)
                };

                match next {
                    None => {
                        self.notify.notified().await;
                        continue;
                    }
                    Some(deadline) => {
                        sleep_until(deadline).await;
                    }
                }

                let now = Instant::now();
                let mut due: Vec<CredentialId> = Vec::new();
                {
                    let mut heap = self.heap.lock().await;
                    while let Some(Reverse((deadline, id))) = heap.peek().copied()
                        && deadline <= now
                    {
                        heap.pop();
                        due.push(id);
                    }
                }

                if due.is_empty() {
                    continue;
                }

                // Clear due bans, guarding against stale entries from a
                // later re-ban of the same credential.
                let mut guard = states.write().await;
                for id in due {
                    let expired = match guard.get(&id) {
                        Some(CredentialState::Banned { until, .. }) => *until <= now,
                        _ => false,
                    };
                    if expired {
                        guard.insert(id, CredentialState::Active);
                        tracing::debug!(credential_id = id, "ban expired, credential recovered");
                    }
                }
            }
        });
    }
}
