//! The `claude` backend descriptor, grounded directly on
//! `other_examples/.../direct_cli.rs`: stream-json output, `--resume`
//! for continuing a backend session, message delivered positionally or
//! via stdin.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;

use super::{
    credential_env_present, credential_file_present, CliBackend, CredentialStatus, SpawnContext,
    StreamMessage,
};

pub struct Claude;

impl CliBackend for Claude {
    fn name(&self) -> &'static str {
        "claude"
    }

    fn binary(&self) -> &'static str {
        "claude"
    }

    fn build_argv(&self, ctx: &SpawnContext<'_>) -> Vec<String> {
        let mut argv = vec![
            "--print".to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
            "--dangerously-skip-permissions".to_string(),
        ];

        if let Some(id) = ctx.resume_backend_session_id {
            argv.push("--resume".to_string());
            argv.push(id.to_string());
        }

        if let Some(prompt) = ctx.system_prompt {
            argv.push("--append-system-prompt".to_string());
            argv.push(prompt.to_string());
        }

        if !ctx.allowed_tools.is_empty() {
            argv.push("--allowedTools".to_string());
            argv.push(ctx.allowed_tools.join(","));
        }

        argv
    }

    fn build_env(&self, _ctx: &SpawnContext<'_>) -> HashMap<String, String> {
        HashMap::new()
    }

    fn format_input(&self, ctx: &SpawnContext<'_>) -> Option<String> {
        // `claude --print` reads the prompt from stdin; no positional
        // message argument is built into argv.
        Some(ctx.message.to_string())
    }

    fn parse_line(&self, line: &str) -> Vec<StreamMessage> {
        let line = line.trim();
        if line.is_empty() {
            return Vec::new();
        }
        let json: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    preview = %line.chars().take(200).collect::<String>(),
                    "claude: failed to parse stream-json line"
                );
                return Vec::new();
            }
        };
        parse_event(&json)
    }

    fn credential_status(
        &self,
        home_dir: &Path,
        env: &HashMap<String, String>,
    ) -> CredentialStatus {
        if credential_file_present(home_dir, ".claude/.credentials.json") == CredentialStatus::Present
        {
            return CredentialStatus::Present;
        }
        credential_env_present(env, "ANTHROPIC_API_KEY")
    }
}

fn parse_event(json: &Value) -> Vec<StreamMessage> {
    let Some(kind) = json.get("type").and_then(Value::as_str) else {
        return Vec::new();
    };

    match kind {
        "system" => {
            if json.get("subtype").and_then(Value::as_str) == Some("init") {
                if let Some(id) = json.get("session_id").and_then(Value::as_str) {
                    return vec![StreamMessage::SessionInit {
                        backend_session_id: id.to_string(),
                    }];
                }
            }
            Vec::new()
        }
        "assistant" => {
            let mut out = Vec::new();
            if let Some(items) = json
                .pointer("/message/content")
                .and_then(Value::as_array)
            {
                for item in items {
                    match item.get("type").and_then(Value::as_str) {
                        Some("tool_use") => {
                            let id = item
                                .get("id")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string();
                            let name = item
                                .get("name")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string();
                            let input = item.get("input").cloned().unwrap_or(Value::Null);
                            out.push(StreamMessage::ToolUse { id, name, input });
                        }
                        Some("thinking") => {
                            if let Some(text) = item.get("thinking").and_then(Value::as_str) {
                                out.push(StreamMessage::Thinking {
                                    text: text.to_string(),
                                });
                            }
                        }
                        Some("text") => {
                            if let Some(text) = item.get("text").and_then(Value::as_str) {
                                out.push(StreamMessage::Text {
                                    text: text.to_string(),
                                });
                            }
                        }
                        _ => {}
                    }
                }
            }
            out
        }
        "user" => {
            let mut out = Vec::new();
            if let Some(items) = json
                .pointer("/message/content")
                .and_then(Value::as_array)
            {
                for item in items {
                    if item.get("type").and_then(Value::as_str) == Some("tool_result") {
                        let id = item
                            .get("tool_use_id")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        let output = item
                            .get("content")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        let is_error = item
                            .get("is_error")
                            .and_then(Value::as_bool)
                            .unwrap_or(false);
                        out.push(StreamMessage::ToolResult {
                            id,
                            output,
                            is_error,
                        });
                    }
                }
            }
            out
        }
        "result" => {
            let is_error = json.get("is_error").and_then(Value::as_bool).unwrap_or(false);
            if is_error {
                let message = json
                    .get("errors")
                    .and_then(Value::as_array)
                    .map(|errs| {
                        errs.iter()
                            .filter_map(Value::as_str)
                            .collect::<Vec<_>>()
                            .join("; ")
                    })
                    .filter(|s| !s.is_empty())
                    .or_else(|| {
                        json.get("error")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                    })
                    .unwrap_or_else(|| "unknown CLI error".to_string());
                return vec![StreamMessage::Error { message }];
            }

            let mut out = Vec::new();
            if let Some(usage) = json.get("usage") {
                let input_tokens = usage.get("input_tokens").and_then(Value::as_u64).unwrap_or(0);
                let output_tokens =
                    usage.get("output_tokens").and_then(Value::as_u64).unwrap_or(0);
                let cache_read_tokens = usage
                    .get("cache_read_input_tokens")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                let cache_write_tokens = usage
                    .get("cache_creation_input_tokens")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                if input_tokens > 0 || output_tokens > 0 {
                    out.push(StreamMessage::Usage {
                        input_tokens,
                        output_tokens,
                        cache_read_tokens,
                        cache_write_tokens,
                    });
                }
            }
            let full_response = json
                .get("result")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            out.push(StreamMessage::Done { full_response });
            out
        }
        _ => Vec::new(),
    }
}
