//! The `ollama` backend descriptor. `ollama run <model>` takes a single
//! prompt on stdin and streams plain text back on stdout -- there is no
//! structured event protocol the way `claude`/`gemini`/`codex` have, so
//! `parse_line` treats every non-empty line as plain text and completion
//! is detected by the process exiting rather than a terminal message.
//! Requires no credentials per spec.md §6 ("ollama requires neither").

use std::collections::HashMap;
use std::path::Path;

use super::{CliBackend, CredentialStatus, SpawnContext, StreamMessage};

/// Model invoked for every turn. `ollama` has no per-session model field
/// to source this from in the current data model; a fixed default is
/// used until the bridge's session config grows a model selector.
const DEFAULT_MODEL: &str = "llama3";

pub struct Ollama;

impl CliBackend for Ollama {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn binary(&self) -> &'static str {
        "ollama"
    }

    fn build_argv(&self, _ctx: &SpawnContext<'_>) -> Vec<String> {
        vec!["run".to_string(), DEFAULT_MODEL.to_string()]
    }

    fn build_env(&self, _ctx: &SpawnContext<'_>) -> HashMap<String, String> {
        HashMap::new()
    }

    fn format_input(&self, ctx: &SpawnContext<'_>) -> Option<String> {
        Some(ctx.message.to_string())
    }

    fn parse_line(&self, line: &str) -> Vec<StreamMessage> {
        if line.trim().is_empty() {
            return Vec::new();
        }
        vec![StreamMessage::Text {
            text: line.to_string(),
        }]
    }

    fn is_complete(&self, _messages: &[StreamMessage]) -> bool {
        // ollama never emits a terminal message; completion is detected
        // by stdout EOF, which `CliSession::read_until_complete` already
        // falls back to when `is_complete` never returns true.
        false
    }

    fn credential_status(&self, _home_dir: &Path, _env: &HashMap<String, String>) -> CredentialStatus {
        CredentialStatus::Present
    }
}
