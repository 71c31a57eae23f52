//! The `gemini` backend descriptor. Same NDJSON-over-stdout shape as
//! `claude`, different flags and event field names, grounded on the same
//! `direct_cli.rs` pattern generalized to a second backend.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;

use super::{
    credential_env_present, credential_file_present, CliBackend, CredentialStatus, SpawnContext,
    StreamMessage,
};

pub struct Gemini;

impl CliBackend for Gemini {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn binary(&self) -> &'static str {
        "gemini"
    }

    fn build_argv(&self, ctx: &SpawnContext<'_>) -> Vec<String> {
        let mut argv = vec!["--output-format".to_string(), "json-lines".to_string()];
        if let Some(id) = ctx.resume_backend_session_id {
            argv.push("--continue".to_string());
            argv.push(id.to_string());
        }
        argv.push(ctx.message.to_string());
        argv
    }

    fn build_env(&self, _ctx: &SpawnContext<'_>) -> HashMap<String, String> {
        HashMap::new()
    }

    fn format_input(&self, _ctx: &SpawnContext<'_>) -> Option<String> {
        // The message is already embedded in argv by `build_argv`.
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
                tracing::warn!(error = %err, "gemini: failed to parse json-lines line");
                return Vec::new();
            }
        };

        match json.get("event").and_then(Value::as_str) {
            Some("session_start") => json
                .get("session_id")
                .and_then(Value::as_str)
                .map(|id| {
                    vec![StreamMessage::SessionInit {
                        backend_session_id: id.to_string(),
                    }]
                })
                .unwrap_or_default(),
            Some("content") => json
                .get("text")
                .and_then(Value::as_str)
                .map(|t| vec![StreamMessage::Text { text: t.to_string() }])
                .unwrap_or_default(),
            Some("tool_call") => {
                let id = json.get("id").and_then(Value::as_str).unwrap_or_default();
                let name = json.get("name").and_then(Value::as_str).unwrap_or_default();
                let input = json.get("args").cloned().unwrap_or(Value::Null);
                vec![StreamMessage::ToolUse {
                    id: id.to_string(),
                    name: name.to_string(),
                    input,
                }]
            }
            Some("error") => vec![StreamMessage::Error {
                message: json
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown gemini error")
                    .to_string(),
            }],
            Some("turn_complete") => vec![StreamMessage::Done {
                full_response: json
                    .get("final_text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
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
        if credential_file_present(home_dir, ".gemini/settings.json") == CredentialStatus::Present {
            return CredentialStatus::Present;
        }
        if credential_env_present(env, "GEMINI_API_KEY") == CredentialStatus::Present {
            return CredentialStatus::Present;
        }
        credential_env_present(env, "GOOGLE_API_KEY")
    }
}
