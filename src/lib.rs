//! agent-bridge: a broker process that bridges a user-facing server to
//! one or more CLI coding agent backends (Claude Code, Gemini CLI, Codex
//! CLI). See `SPEC_FULL.md` at the repository root for the full design.

pub mod backend;
pub mod cli_session;
pub mod concurrency;
pub mod config;
pub mod context_builder;
pub mod context_store;
pub mod error;
pub mod events;
pub mod http;
pub mod message_handler;
pub mod pipeline;
pub mod pool;
pub mod session;
pub mod socket;
pub mod supervisor;
pub mod task_queue;

pub use error::{BridgeError, Result};
