//! `SessionContext` and its status state machine, grounded on
//! `crates/ai-session/src/core/lifecycle.rs`'s guard-read/check/mutate
//! pattern over an `Arc<RwLock<_>>`.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::backend::BackendKind;
use crate::config::SessionConfig;

const EVENT_LOG_CAP: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Idle,
    Locked,
    Injecting,
    Streaming,
    Finalizing,
    Complete,
    Error,
}

impl Status {
    /// Whether `self -> next` is a legal forward transition. Any status
    /// may move sideways to `Error`.
    fn can_transition_to(self, next: Status) -> bool {
        if next == Status::Error {
            return true;
        }
        use Status::*;
        matches!(
            (self, next),
            (Idle, Locked)
                | (Locked, Injecting)
                | (Locked, Streaming)
                | (Injecting, Streaming)
                | (Streaming, Finalizing)
                | (Finalizing, Complete)
                | (Complete, Idle)
                | (Error, Idle)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentMessage {
    pub id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditingContext {
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub context_injected: bool,
    /// The `entity_id` a full injection was last built for, `None` if
    /// no full injection has happened yet. Differs from `entity_id`
    /// exactly when a fresh full injection is due.
    pub last_injected_entity_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionQueue {
    pub inbound: VecDeque<String>,
    pub outbound: VecDeque<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextUsage {
    pub used: u64,
    pub total: u64,
    pub percent: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub kind: String,
    pub at: DateTime<Utc>,
    pub detail: HashMap<String, String>,
}

/// The full, serializable state of one bridge session. `session_id` is
/// immutable once created; `status` only moves via [`SessionContext::transition`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContextSnapshot {
    pub session_id: String,
    pub backend: BackendKind,
    pub status: Status,
    pub current_message: Option<CurrentMessage>,
    pub backend_session_id: Option<String>,
    pub editing_context: Option<EditingContext>,
    pub queue: SessionQueue,
    pub events: Vec<SessionEvent>,
    pub context_usage: Option<ContextUsage>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

/// The mutable, lock-guarded session state. Cloning a snapshot out of it
/// is cheap and is what the debug HTTP endpoint and the event log return.
pub struct SessionContext {
    session_id: String,
    config: RwLock<SessionConfig>,
    status: RwLock<Status>,
    current_message: RwLock<Option<CurrentMessage>>,
    backend_session_id: RwLock<Option<String>>,
    editing_context: RwLock<Option<EditingContext>>,
    queue: RwLock<SessionQueue>,
    events: RwLock<VecDeque<SessionEvent>>,
    context_usage: RwLock<Option<ContextUsage>>,
    created_at: DateTime<Utc>,
    last_activity_at: RwLock<DateTime<Utc>>,
}

impl SessionContext {
    /// Build a session with a freshly minted id -- used where no caller
    /// supplies one (tests, and anywhere a session is created outside the
    /// `session:message`-driven `getOrCreate` path).
    pub fn new(backend: BackendKind) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), backend)
    }

    /// Build a session under a caller-supplied id, per `getOrCreate`'s
    /// lazy-creation contract: the server names the session id, the
    /// bridge doesn't get to mint its own.
    pub fn with_id(session_id: String, backend: BackendKind) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            config: RwLock::new(SessionConfig::new(backend, PathBuf::from("."))),
            status: RwLock::new(Status::Idle),
            current_message: RwLock::new(None),
            backend_session_id: RwLock::new(None),
            editing_context: RwLock::new(None),
            queue: RwLock::new(SessionQueue::default()),
            events: RwLock::new(VecDeque::new()),
            context_usage: RwLock::new(None),
            created_at: now,
            last_activity_at: RwLock::new(now),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn backend(&self) -> BackendKind {
        self.config.read().await.backend
    }

    pub async fn config(&self) -> SessionConfig {
        self.config.read().await.clone()
    }

    pub async fn set_config(&self, config: SessionConfig) {
        *self.config.write().await = config;
    }

    pub async fn status(&self) -> Status {
        *self.status.read().await
    }

    /// Attempt the `self.status -> next` transition. Returns `Err` if the
    /// transition is not legal (per [`Status::can_transition_to`]), never
    /// mutating state in that case.
    pub async fn transition(&self, next: Status) -> Result<(), crate::error::BridgeError> {
        let mut status = self.status.write().await;
        if !status.can_transition_to(next) {
            return Err(crate::error::BridgeError::Fatal {
                message: format!("illegal session status transition {:?} -> {:?}", *status, next),
            });
        }
        *status = next;
        drop(status);
        *self.last_activity_at.write().await = Utc::now();

        if next == Status::Complete {
            self.queue.write().await.inbound.clear();
        }
        Ok(())
    }

    pub async fn set_backend_session_id(&self, id: String) {
        *self.backend_session_id.write().await = Some(id);
    }

    pub async fn backend_session_id(&self) -> Option<String> {
        self.backend_session_id.read().await.clone()
    }

    pub async fn set_current_message(&self, id: String, content: String) {
        *self.current_message.write().await = Some(CurrentMessage {
            id,
            content,
            created_at: Utc::now(),
        });
    }

    pub async fn current_message(&self) -> Option<CurrentMessage> {
        self.current_message.read().await.clone()
    }

    pub async fn set_editing_context(&self, ctx: EditingContext) {
        *self.editing_context.write().await = Some(ctx);
    }

    pub async fn editing_context(&self) -> Option<EditingContext> {
        self.editing_context.read().await.clone()
    }

    pub async fn set_context_usage(&self, usage: ContextUsage) {
        *self.context_usage.write().await = Some(usage);
    }

    pub async fn context_usage(&self) -> Option<ContextUsage> {
        self.context_usage.read().await.clone()
    }

    pub async fn last_activity_at(&self) -> DateTime<Utc> {
        *self.last_activity_at.read().await
    }

    /// Append an audit event, dropping the oldest entry once the log is
    /// at capacity (`EVENT_LOG_CAP`).
    pub async fn push_event(&self, kind: impl Into<String>, detail: HashMap<String, String>) {
        let mut events = self.events.write().await;
        if events.len() >= EVENT_LOG_CAP {
            events.pop_front();
        }
        events.push_back(SessionEvent {
            kind: kind.into(),
            at: Utc::now(),
            detail,
        });
    }

    pub async fn snapshot(&self) -> SessionContextSnapshot {
        SessionContextSnapshot {
            session_id: self.session_id.clone(),
            backend: self.backend().await,
            status: self.status().await,
            current_message: self.current_message.read().await.clone(),
            backend_session_id: self.backend_session_id().await,
            editing_context: self.editing_context().await,
            queue: self.queue.read().await.clone(),
            events: self.events.read().await.iter().cloned().collect(),
            context_usage: self.context_usage.read().await.clone(),
            created_at: self.created_at,
            last_activity_at: *self.last_activity_at.read().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forward_transitions_succeed() {
        let ctx = SessionContext::new(BackendKind::Claude);
        ctx.transition(Status::Locked).await.unwrap();
        ctx.transition(Status::Streaming).await.unwrap();
        ctx.transition(Status::Finalizing).await.unwrap();
        ctx.transition(Status::Complete).await.unwrap();
        assert_eq!(ctx.status().await, Status::Complete);
    }

    #[tokio::test]
    async fn backward_transition_is_rejected() {
        let ctx = SessionContext::new(BackendKind::Claude);
        ctx.transition(Status::Locked).await.unwrap();
        ctx.transition(Status::Streaming).await.unwrap();
        let err = ctx.transition(Status::Locked).await;
        assert!(err.is_err());
        assert_eq!(ctx.status().await, Status::Streaming);
    }

    #[tokio::test]
    async fn any_status_can_go_sideways_to_error() {
        let ctx = SessionContext::new(BackendKind::Claude);
        ctx.transition(Status::Locked).await.unwrap();
        ctx.transition(Status::Error).await.unwrap();
        assert_eq!(ctx.status().await, Status::Error);
    }

    #[tokio::test]
    async fn finalize_clears_inbound_queue() {
        let ctx = SessionContext::new(BackendKind::Claude);
        ctx.queue.write().await.inbound.push_back("queued".into());
        ctx.transition(Status::Locked).await.unwrap();
        ctx.transition(Status::Streaming).await.unwrap();
        ctx.transition(Status::Finalizing).await.unwrap();
        ctx.transition(Status::Complete).await.unwrap();
        assert!(ctx.queue.read().await.inbound.is_empty());
    }

    #[tokio::test]
    async fn event_log_drops_oldest_past_cap() {
        let ctx = SessionContext::new(BackendKind::Claude);
        for i in 0..(EVENT_LOG_CAP + 10) {
            ctx.push_event(format!("evt-{i}"), HashMap::new()).await;
        }
        let snap = ctx.snapshot().await;
        assert_eq!(snap.events.len(), EVENT_LOG_CAP);
        assert_eq!(snap.events.front().unwrap().kind, "evt-10");
    }

    #[tokio::test]
    async fn with_id_keeps_the_caller_supplied_id() {
        let ctx = SessionContext::with_id("caller-chosen".to_string(), BackendKind::Gemini);
        assert_eq!(ctx.session_id(), "caller-chosen");
        assert_eq!(ctx.backend().await, BackendKind::Gemini);
    }
}
