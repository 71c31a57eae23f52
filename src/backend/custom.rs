//! The `custom` pass-through backend, for an operator-supplied CLI agent
//! binary that speaks neither `claude`'s nor `gemini`'s protocol. Flags
//! and input delivery are kept deliberately minimal and generic since no
//! convention can be assumed for an arbitrary binary; `parse_line`
//! attempts a small common JSON shape before falling back to treating the
//! raw line as plain text.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;

use super::{CliBackend, CredentialStatus, SpawnContext, StreamMessage};

/// Executable name for the pass-through backend. Not configurable at
/// runtime: there is no `once_cell`/lazy-static dependency in this crate
/// to back an env-derived `&'static str`, and `CliBackend::binary`'s
/// signature returns a `&'static str` rather than an owned `String`.
const CUSTOM_BINARY: &str = "custom-agent";

pub struct Custom;

impl CliBackend for Custom {
    fn name(&self) -> &'static str {
        "custom"
    }

    fn binary(&self) -> &'static str {
        CUSTOM_BINARY
    }

    fn build_argv(&self, ctx: &SpawnContext<'_>) -> Vec<String> {
        let mut argv = Vec::new();
        if let Some(id) = ctx.resume_backend_session_id {
            argv.push("--resume".to_string());
            argv.push(id.to_string());
        }
        argv
    }

    fn build_env(&self, ctx: &SpawnContext<'_>) -> HashMap<String, String> {
        let mut env = HashMap::new();
        if let Some(prompt) = ctx.system_prompt {
            env.insert("BRIDGE_SYSTEM_PROMPT".to_string(), prompt.to_string());
        }
        if !ctx.allowed_tools.is_empty() {
            env.insert("BRIDGE_ALLOWED_TOOLS".to_string(), ctx.allowed_tools.join(","));
        }
        env
    }

    fn format_input(&self, ctx: &SpawnContext<'_>) -> Option<String> {
        Some(ctx.message.to_string())
    }

    fn parse_line(&self, line: &str) -> Vec<StreamMessage> {
        let line = line.trim();
        if line.is_empty() {
            return Vec::new();
        }
        match serde_json::from_str::<Value>(line) {
            Ok(json) => match json.get("text").and_then(Value::as_str) {
                Some(text) => vec![StreamMessage::Text {
                    text: text.to_string(),
                }],
                None => vec![StreamMessage::Text {
                    text: line.to_string(),
                }],
            },
            Err(_) => vec![StreamMessage::Text {
                text: line.to_string(),
            }],
        }
    }

    fn is_complete(&self, _messages: &[StreamMessage]) -> bool {
        false
    }

    fn credential_status(&self, _home_dir: &Path, _env: &HashMap<String, String>) -> CredentialStatus {
        CredentialStatus::Present
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_fall_back_to_text() {
        assert_eq!(
            Custom.parse_line("not json at all"),
            vec![StreamMessage::Text {
                text: "not json at all".to_string()
            }]
        );
    }

    #[test]
    fn json_with_a_text_field_is_extracted() {
        assert_eq!(
            Custom.parse_line(r#"{"text":"hi there"}"#),
            vec![StreamMessage::Text {
                text: "hi there".to_string()
            }]
        );
    }

    #[test]
    fn system_prompt_and_tools_go_through_env() {
        let ctx = SpawnContext {
            message: "hi",
            resume_backend_session_id: None,
            system_prompt: Some("be terse"),
            allowed_tools: &["search".to_string()],
        };
        let env = Custom.build_env(&ctx);
        assert_eq!(env.get("BRIDGE_SYSTEM_PROMPT").unwrap(), "be terse");
        assert_eq!(env.get("BRIDGE_ALLOWED_TOOLS").unwrap(), "search");
    }
}
