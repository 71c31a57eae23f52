//! The inbound/outbound socket event shapes from spec.md §6.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HaltReason;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    #[serde(rename = "session:message")]
    SessionMessage {
        session_id: String,
        message_id: String,
        content: String,
    },
    #[serde(rename = "session:stop")]
    SessionStop { session_id: String },
    #[serde(rename = "session:human_input_response")]
    SessionHumanInputResponse {
        session_id: String,
        request_id: String,
        response: Value,
    },
    #[serde(rename = "bridge:register")]
    BridgeRegister { bridge_id: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseMessage {
    pub id: String,
    pub content: String,
    pub role: &'static str,
    pub streaming: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    #[serde(rename = "session:response")]
    SessionResponse {
        session_id: String,
        message_id: String,
        message: ResponseMessage,
    },
    #[serde(rename = "session:tool_use")]
    SessionToolUse {
        session_id: String,
        id: String,
        name: String,
        input: Value,
    },
    #[serde(rename = "session:thinking")]
    SessionThinking { session_id: String, text: String },
    #[serde(rename = "session:activity")]
    SessionActivity { session_id: String, detail: String },
    #[serde(rename = "session:progress")]
    SessionProgress { session_id: String, percent: f32 },
    #[serde(rename = "session:context_usage")]
    SessionContextUsage {
        session_id: String,
        used: u64,
        total: u64,
        percent: f32,
    },
    #[serde(rename = "session:context_injected")]
    SessionContextInjected { session_id: String },
    #[serde(rename = "session:compacted")]
    SessionCompacted { session_id: String },
    #[serde(rename = "session:error")]
    SessionError {
        session_id: String,
        message: String,
    },
    #[serde(rename = "session:halted")]
    SessionHalted {
        session_id: String,
        reason: HaltReason,
        can_resume: bool,
    },
    #[serde(rename = "session:pipeline_event")]
    SessionPipelineEvent {
        session_id: String,
        kind: String,
    },
    #[serde(rename = "session:pipeline_state")]
    SessionPipelineState {
        session_id: String,
        status: crate::session::Status,
    },
    #[serde(rename = "bridge:heartbeat")]
    BridgeHeartbeat { active_message_ids: Vec<String> },
    #[serde(rename = "bridge:register")]
    BridgeRegisterAck { bridge_id: String, ok: bool },
}
