//! The tagged stream-message enum that replaces the duck-typed event
//! objects a CLI agent's NDJSON output would otherwise produce, per the
//! Design Notes' guidance to use a typed channel/stream instead of a
//! lazy async sequence of loosely-typed messages.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// The backend announced (or re-announced) its own session id.
    SessionInit { backend_session_id: String },
    /// A chunk of assistant-visible thinking/reasoning text.
    Thinking { text: String },
    /// A chunk of assistant-visible reply text.
    Text { text: String },
    /// The backend invoked a tool.
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    /// A tool call produced a result.
    ToolResult {
        id: String,
        output: String,
        is_error: bool,
    },
    /// Context-window usage reported by the backend.
    Usage {
        input_tokens: u64,
        output_tokens: u64,
        cache_read_tokens: u64,
        cache_write_tokens: u64,
    },
    /// The backend's session was not found (e.g. a stale `--resume` id).
    SessionOrphaned,
    /// The turn finished normally.
    Done { full_response: String },
    /// The backend reported an in-band error (not a process exit).
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_are_structurally_comparable() {
        let a = StreamMessage::Text {
            text: "hi".to_string(),
        };
        let b = StreamMessage::Text {
            text: "hi".to_string(),
        };
        assert_eq!(a, b);
    }
}
