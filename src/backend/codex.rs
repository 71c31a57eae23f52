//! The `codex` backend descriptor.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;

use super::{
    credential_env_present, credential_file_present, CliBackend, CredentialStatus, SpawnContext,
    StreamMessage,
};

pub struct Codex;

impl CliBackend for Codex {
    fn name(&self) -> &'static str {
        "codex"
    }

    fn binary(&self) -> &'static str {
        "codex"
    }

    fn build_argv(&self, ctx: &SpawnContext<'_>) -> Vec<String> {
        let mut argv = vec!["exec".to_string(), "--json".to_string()];
        if let Some(id) = ctx.resume_backend_session_id {
            argv.push("--session".to_string());
            argv.push(id.to_string());
        }
        argv.push(ctx.message.to_string());
        argv
    }

    fn build_env(&self, _ctx: &SpawnContext<'_>) -> HashMap<String, String> {
        HashMap::new()
    }

    fn format_input(&self, _ctx: &SpawnContext<'_>) -> Option<String> {
        None
    }

    fn parse_line(&self, line: &str) -> Vec<StreamMessage> {
        let line = line.trim();
        if line.is_empty() {
            return Vec::new();
        }
        let json: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(error = %err, "codex: failed to parse json line");
                return Vec::new();
            }
        };

        match json.get("type").and_then(Value::as_str) {
            Some("session_id") => json
                .get("id")
                .and_then(Value::as_str)
                .map(|id| {
                    vec![StreamMessage::SessionInit {
                        backend_session_id: id.to_string(),
                    }]
                })
                .unwrap_or_default(),
            Some("agent_message") => json
                .get("message")
                .and_then(Value::as_str)
                .map(|t| vec![StreamMessage::Text { text: t.to_string() }])
                .unwrap_or_default(),
            Some("task_complete") => vec![StreamMessage::Done {
                full_response: json
                    .get("last_message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }],
            Some("error") => vec![StreamMessage::Error {
                message: json
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown codex error")
                    .to_string(),
            }],
            _ => Vec::new(),
        }
    }

    fn credential_status(
        &self,
        home_dir: &Path,
        env: &HashMap<String, String>,
    ) -> CredentialStatus {
        if credential_file_present(home_dir, ".codex/auth.json") == CredentialStatus::Present {
            return CredentialStatus::Present;
        }
        credential_env_present(env, "OPENAI_API_KEY")
    }
}
