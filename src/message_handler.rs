//! The message handler (C9): dispatches inbound socket events, drives a
//! turn through the pipeline, and formats failures into the
//! `{errorMessage, haltReason}` shape `session:halted` needs. Grounded on
//! `other_examples/.../gateway-bridge.rs`'s dispatch loop and
//! `format_agent_error`.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::concurrency::ConcurrencyManager;
use crate::context_builder::ContextBuilder;
use crate::context_store::SessionContextStore;
use crate::error::BridgeError;
use crate::events::{InboundEvent, OutboundEvent, ResponseMessage};
use crate::pipeline::{stages::standard_stages, Pipeline, TurnInput};
use crate::pool::AssistantPool;
use crate::socket::SocketConnectionManager;

/// A pending `session:human_input_response` the message handler is
/// blocking on, keyed by `request_id`.
#[derive(Default)]
pub struct HumanInputWaiters {
    pending: dashmap::DashMap<String, oneshot::Sender<serde_json::Value>>,
}

impl HumanInputWaiters {
    pub fn register(&self, request_id: String) -> oneshot::Receiver<serde_json::Value> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id, tx);
        rx
    }

    pub fn fulfil(&self, request_id: &str, response: serde_json::Value) -> bool {
        if let Some((_, tx)) = self.pending.remove(request_id) {
            let _ = tx.send(response);
            true
        } else {
            false
        }
    }
}

pub struct MessageHandler {
    sessions: Arc<SessionContextStore>,
    concurrency: Arc<ConcurrencyManager>,
    pool: Arc<AssistantPool>,
    context_builder: Arc<ContextBuilder>,
    socket: Arc<SocketConnectionManager>,
    human_input: Arc<HumanInputWaiters>,
}

impl MessageHandler {
    pub fn new(
        sessions: Arc<SessionContextStore>,
        concurrency: Arc<ConcurrencyManager>,
        pool: Arc<AssistantPool>,
        context_builder: Arc<ContextBuilder>,
        socket: Arc<SocketConnectionManager>,
        human_input: Arc<HumanInputWaiters>,
    ) -> Self {
        Self {
            sessions,
            concurrency,
            pool,
            context_builder,
            socket,
            human_input,
        }
    }

    pub async fn handle(&self, event: InboundEvent) {
        match event {
            InboundEvent::SessionMessage {
                session_id,
                message_id,
                content,
            } => {
                self.handle_session_message(session_id, message_id, content)
                    .await;
            }
            InboundEvent::SessionStop { session_id } => {
                self.concurrency.clear_session(&session_id).await;
            }
            InboundEvent::SessionHumanInputResponse {
                request_id,
                response,
                ..
            } => {
                self.human_input.fulfil(&request_id, response);
            }
            InboundEvent::BridgeRegister { bridge_id } => {
                let _ = self
                    .socket
                    .send(&OutboundEvent::BridgeRegisterAck {
                        bridge_id,
                        ok: true,
                    })
                    .await;
            }
        }
    }

    async fn handle_session_message(&self, session_id: String, message_id: String, content: String) {
        let session = self
            .sessions
            .get_or_create(&session_id, crate::backend::BackendKind::Claude);

        if let Err(err) = self.concurrency.acquire_lock(&session_id, &message_id).await {
            self.emit_error(&session_id, &err).await;
            return;
        }

        session.set_current_message(message_id.clone(), content.clone()).await;

        let cancel = CancellationToken::new();
        let pipeline = Pipeline::new(standard_stages())
            .with_stage_timeout("acquire-lock", std::time::Duration::from_secs(30))
            .with_stage_timeout("finalize", std::time::Duration::from_secs(5));

        let config = session.config().await;
        let turn = TurnInput {
            message_id: message_id.clone(),
            content,
            working_dir: config.working_directory.clone(),
            resume_backend_session_id: session.backend_session_id().await,
            system_prompt: config.system_prompt.clone(),
            allowed_tools: config.allowed_tools.clone(),
        };

        let result = pipeline
            .run(&session, cancel, self.pool.clone(), self.context_builder.clone(), &turn)
            .await;
        self.concurrency.release_lock(&session_id).await;

        match result {
            Ok(outcome) => {
                if !outcome.thinking_text.is_empty() {
                    let _ = self
                        .socket
                        .send(&OutboundEvent::SessionThinking {
                            session_id: session_id.clone(),
                            text: outcome.thinking_text,
                        })
                        .await;
                }
                for (id, name, input) in outcome.tool_uses {
                    let _ = self
                        .socket
                        .send(&OutboundEvent::SessionToolUse {
                            session_id: session_id.clone(),
                            id,
                            name,
                            input,
                        })
                        .await;
                }
                if let Some(usage) = outcome.context_usage.clone() {
                    session.set_context_usage(usage.clone()).await;
                    let _ = self
                        .socket
                        .send(&OutboundEvent::SessionContextUsage {
                            session_id: session_id.clone(),
                            used: usage.used,
                            total: usage.total,
                            percent: usage.percent,
                        })
                        .await;
                }
                let _ = self
                    .socket
                    .send(&OutboundEvent::SessionResponse {
                        session_id: session_id.clone(),
                        message_id,
                        message: ResponseMessage {
                            id: uuid::Uuid::new_v4().to_string(),
                            content: outcome.response_text,
                            role: "assistant",
                            streaming: false,
                            created_at: chrono::Utc::now(),
                        },
                    })
                    .await;
            }
            Err(err) => {
                let _ = session.transition(crate::session::Status::Error).await;
                self.pool.close(&session_id).await;
                self.emit_error(&session_id, &err).await;
            }
        }
    }

    async fn emit_error(&self, session_id: &str, err: &BridgeError) {
        let (error_message, halt_reason) = format_error(err);
        let _ = self
            .socket
            .send(&OutboundEvent::SessionError {
                session_id: session_id.to_string(),
                message: error_message,
            })
            .await;
        if let Some(reason) = halt_reason {
            let _ = self
                .socket
                .send(&OutboundEvent::SessionHalted {
                    session_id: session_id.to_string(),
                    reason,
                    can_resume: err.can_resume(),
                })
                .await;
        }
    }
}

/// Turn a [`BridgeError`] into the `{errorMessage, haltReason}` pair
/// `session:halted` needs, with human-readable guidance per error kind --
/// the same per-kind formatting `format_agent_error` applies to its
/// typed `AgentError` variants.
fn format_error(err: &BridgeError) -> (String, Option<crate::error::HaltReason>) {
    let message = match err {
        BridgeError::CliTimeout { timeout_secs, .. } => {
            format!("The assistant did not respond within {timeout_secs}s.")
        }
        BridgeError::CliProcessExit { status, .. } => {
            format!("The assistant process exited unexpectedly ({status}).")
        }
        BridgeError::CliError { message, .. } => message.clone(),
        BridgeError::ConcurrencyAbandoned { .. } => {
            "This message was dropped because the session was stopped.".to_string()
        }
        other => other.to_string(),
    };
    (message, err.halt_reason())
}
