//! Static, per-backend descriptors: pure functions for building argv/env,
//! parsing a line of output and extracting content from it, and checking
//! whether credentials are present. Grounded on
//! `other_examples/.../direct_cli.rs` (argv construction, line parsing)
//! and `other_examples/.../backend/mod.rs` (the `Backend` trait shape),
//! adapted into separable pure functions per spec.

pub mod claude;
pub mod codex;
pub mod custom;
pub mod gemini;
pub mod ollama;
pub mod stream;

pub use stream::StreamMessage;

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// The backends recognised by the core. Deserializing a backend name that
/// doesn't match one of these variants fails fast with a `serde_json`
/// error at the parse boundary -- there is no silent "unknown backend"
/// fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Claude,
    Gemini,
    Codex,
    Ollama,
    Custom,
}

impl BackendKind {
    pub fn descriptor(self) -> &'static dyn CliBackend {
        match self {
            BackendKind::Claude => &claude::Claude,
            BackendKind::Gemini => &gemini::Gemini,
            BackendKind::Codex => &codex::Codex,
            BackendKind::Ollama => &ollama::Ollama,
            BackendKind::Custom => &custom::Custom,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    Present,
    Missing,
}

/// Inputs shared by every `buildArgv`/`buildEnv` call.
pub struct SpawnContext<'a> {
    pub message: &'a str,
    pub resume_backend_session_id: Option<&'a str>,
    pub system_prompt: Option<&'a str>,
    pub allowed_tools: &'a [String],
}

/// The static behaviour of one CLI backend. Every method is a pure
/// function over its inputs; no method holds state or spawns anything
/// itself (that's `crate::cli_session::CliSession`'s job).
pub trait CliBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// The executable to invoke.
    fn binary(&self) -> &'static str;

    /// Build the argv (excluding the binary itself) for one turn.
    fn build_argv(&self, ctx: &SpawnContext<'_>) -> Vec<String>;

    /// Build extra environment variables for the child process.
    fn build_env(&self, ctx: &SpawnContext<'_>) -> HashMap<String, String>;

    /// When `Some`, the message is written to the child's stdin (and
    /// stdin is then closed) instead of being passed as an argv
    /// positional. Returning `None` means the message was already
    /// embedded into argv by `build_argv`.
    fn format_input(&self, ctx: &SpawnContext<'_>) -> Option<String>;

    /// Parse one line of the child's stdout into zero or more stream
    /// messages. A line that fails to parse yields an empty vec, not an
    /// error -- malformed output lines are logged and skipped by the
    /// caller, not treated as CLI errors.
    fn parse_line(&self, line: &str) -> Vec<StreamMessage>;

    /// Whether `messages` (accumulated so far for the current turn)
    /// contains a terminal message.
    fn is_complete(&self, messages: &[StreamMessage]) -> bool {
        messages.iter().any(|m| {
            matches!(
                m,
                StreamMessage::Done { .. } | StreamMessage::SessionOrphaned
            )
        })
    }

    /// Check whether credentials for this backend are present on disk or
    /// in the environment.
    fn credential_status(&self, home_dir: &Path, env: &HashMap<String, String>) -> CredentialStatus;
}

pub(crate) fn extract_content(messages: &[StreamMessage]) -> String {
    messages
        .iter()
        .filter_map(|m| match m {
            StreamMessage::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

pub(crate) fn extract_thinking(messages: &[StreamMessage]) -> String {
    messages
        .iter()
        .filter_map(|m| match m {
            StreamMessage::Thinking { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

pub(crate) fn extract_tool_uses(messages: &[StreamMessage]) -> Vec<(String, String, serde_json::Value)> {
    messages
        .iter()
        .filter_map(|m| match m {
            StreamMessage::ToolUse { id, name, input } => {
                Some((id.clone(), name.clone(), input.clone()))
            }
            _ => None,
        })
        .collect()
}

pub(crate) fn extract_tool_results(messages: &[StreamMessage]) -> Vec<(String, String, bool)> {
    messages
        .iter()
        .filter_map(|m| match m {
            StreamMessage::ToolResult {
                id,
                output,
                is_error,
            } => Some((id.clone(), output.clone(), *is_error)),
            _ => None,
        })
        .collect()
}

pub(crate) fn extract_usage(messages: &[StreamMessage]) -> Option<(u64, u64, u64, u64)> {
    messages.iter().find_map(|m| match m {
        StreamMessage::Usage {
            input_tokens,
            output_tokens,
            cache_read_tokens,
            cache_write_tokens,
        } => Some((*input_tokens, *output_tokens, *cache_read_tokens, *cache_write_tokens)),
        _ => None,
    })
}

fn credential_file_present(home_dir: &Path, relative: &str) -> CredentialStatus {
    if home_dir.join(relative).is_file() {
        CredentialStatus::Present
    } else {
        CredentialStatus::Missing
    }
}

fn credential_env_present(env: &HashMap<String, String>, var: &str) -> CredentialStatus {
    if env.get(var).is_some_and(|v| !v.is_empty()) {
        CredentialStatus::Present
    } else {
        CredentialStatus::Missing
    }
}
