//! The session-context store (C4): a concurrent registry of
//! [`SessionContext`]s keyed by session id, grounded on the
//! `Arc<RwLock<HashMap<..>>>` registries throughout the teacher (e.g.
//! `hitl/mod.rs`'s pending-approval map) adapted to `DashMap` for the
//! higher-churn per-message path.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;

use crate::backend::BackendKind;
use crate::session::{SessionContext, SessionContextSnapshot, Status};

/// How long a session may sit in a non-idle, non-complete status before
/// `getBadSessions` considers it stuck.
const STALE_ACTIVITY_SECS: i64 = 300;

#[derive(Default)]
pub struct SessionContextStore {
    sessions: DashMap<String, Arc<SessionContext>>,
}

impl SessionContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, backend: BackendKind) -> Arc<SessionContext> {
        let ctx = Arc::new(SessionContext::new(backend));
        self.sessions.insert(ctx.session_id().to_string(), ctx.clone());
        ctx
    }

    /// Fetch the session registered under `session_id`, or lazily create
    /// one under that exact id if none exists yet. `backend` is only used
    /// on the creation path; an existing session keeps its own backend.
    pub fn get_or_create(&self, session_id: &str, backend: BackendKind) -> Arc<SessionContext> {
        if let Some(existing) = self.get(session_id) {
            return existing;
        }
        let ctx = Arc::new(SessionContext::with_id(session_id.to_string(), backend));
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| ctx.clone())
            .value()
            .clone()
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<SessionContext>> {
        self.sessions.get(session_id).map(|e| e.value().clone())
    }

    pub fn remove(&self, session_id: &str) -> Option<Arc<SessionContext>> {
        self.sessions.remove(session_id).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// A read-only debug snapshot of one session, for the
    /// `GET /debug/sessions/:id/context` HTTP route.
    pub async fn snapshot(&self, session_id: &str) -> Option<SessionContextSnapshot> {
        let ctx = self.get(session_id)?;
        Some(ctx.snapshot().await)
    }

    /// Sessions in `Error` status, or in any non-idle/non-complete status
    /// whose `last_activity_at` is older than the staleness threshold --
    /// candidates for operator attention or a forced `session:stop`.
    pub async fn get_bad_sessions(&self) -> Vec<Arc<SessionContext>> {
        let handles: Vec<_> = self.sessions.iter().map(|e| e.value().clone()).collect();
        let mut bad = Vec::new();
        for ctx in handles {
            let status = ctx.status().await;
            if status == Status::Error {
                bad.push(ctx);
                continue;
            }
            if status == Status::Idle || status == Status::Complete {
                continue;
            }
            let age = Utc::now() - ctx.last_activity_at().await;
            if age.num_seconds() > STALE_ACTIVITY_SECS {
                bad.push(ctx);
            }
        }
        bad
    }
}
