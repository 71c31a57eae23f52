//! `ConcurrencyManager` (C5): a per-session FIFO lock. Grounded on
//! `hitl/mod.rs`'s pending-map-plus-channel pattern, tightened so the
//! hand-off from `release_lock` to the next waiter's `acquire_lock`
//! happens while still holding the per-session mutex -- there is no
//! window where the lock looks free to a third party.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{oneshot, Mutex};

use crate::error::{BridgeError, Result};

struct Waiter {
    message_id: String,
    grant: oneshot::Sender<std::result::Result<(), BridgeError>>,
}

#[derive(Default)]
struct SessionLockState {
    processing: bool,
    processing_message_id: Option<String>,
    pending: VecDeque<Waiter>,
}

#[derive(Default)]
pub struct ConcurrencyManager {
    states: DashMap<String, Arc<Mutex<SessionLockState>>>,
}

impl ConcurrencyManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn state_for(&self, session_id: &str) -> Arc<Mutex<SessionLockState>> {
        self.states
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(SessionLockState::default())))
            .clone()
    }

    /// Acquire the per-session processing lock for `message_id`. Resolves
    /// immediately if the session is idle; otherwise enqueues FIFO behind
    /// any other waiters and resolves once every earlier waiter has
    /// released.
    pub async fn acquire_lock(&self, session_id: &str, message_id: &str) -> Result<()> {
        let state = self.state_for(session_id);
        let rx = {
            let mut guard = state.lock().await;
            if !guard.processing {
                guard.processing = true;
                guard.processing_message_id = Some(message_id.to_string());
                None
            } else if guard.pending.len() >= crate::task_queue::CAPACITY {
                return Err(BridgeError::Validation {
                    message: format!(
                        "task queue at capacity ({})",
                        crate::task_queue::CAPACITY
                    ),
                });
            } else {
                let (tx, rx) = oneshot::channel();
                guard.pending.push_back(Waiter {
                    message_id: message_id.to_string(),
                    grant: tx,
                });
                Some(rx)
            }
        };

        match rx {
            None => Ok(()),
            Some(rx) => rx.await.unwrap_or(Err(BridgeError::ConcurrencyAbandoned {
                session_id: session_id.to_string(),
            })),
        }
    }

    /// Release the lock, handing it directly to the next FIFO waiter (if
    /// any) without ever marking the session as free in between.
    pub async fn release_lock(&self, session_id: &str) {
        let state = self.state_for(session_id);
        let mut guard = state.lock().await;
        match guard.pending.pop_front() {
            Some(waiter) => {
                guard.processing_message_id = Some(waiter.message_id);
                let _ = waiter.grant.send(Ok(()));
            }
            None => {
                guard.processing = false;
                guard.processing_message_id = None;
            }
        }
    }

    /// Reject every queued waiter for `session_id` and reset it to idle.
    /// Used by `session:stop` fail-fast handling.
    pub async fn clear_session(&self, session_id: &str) {
        let state = self.state_for(session_id);
        let mut guard = state.lock().await;
        while let Some(waiter) = guard.pending.pop_front() {
            let _ = waiter.grant.send(Err(BridgeError::ConcurrencyAbandoned {
                session_id: session_id.to_string(),
            }));
        }
        guard.processing = false;
        guard.processing_message_id = None;
    }

    /// The message id currently holding the lock, per session, across all
    /// sessions -- used to build `bridge:heartbeat.activeMessageIds`.
    pub async fn active_message_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for entry in self.states.iter() {
            let guard = entry.value().lock().await;
            if let Some(id) = &guard.processing_message_id {
                ids.push(id.clone());
            }
            for waiter in &guard.pending {
                ids.push(waiter.message_id.clone());
            }
        }
        ids
    }
}
