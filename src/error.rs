//! Error taxonomy for the bridge, grounded on `CCSwarmError`'s
//! shape: a flat `thiserror` enum with named kinds, a few `#[from]`
//! conversions, and a severity/halt-reason mapping consumers can act on.

use thiserror::Error;

/// The reason surfaced on a `session:halted` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    Timeout,
    CliError,
    ProcessExit,
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("validation failed: {message}")]
    Validation { message: String },

    #[error("backend `{backend}` timed out after {timeout_secs}s (session {session_id})")]
    CliTimeout {
        backend: String,
        session_id: String,
        timeout_secs: u64,
    },

    #[error("backend `{backend}` exited with status {status} (session {session_id})")]
    CliProcessExit {
        backend: String,
        session_id: String,
        status: String,
        stderr_tail: Vec<String>,
    },

    #[error("backend `{backend}` reported an error: {message}")]
    CliError { backend: String, message: String },

    #[error("pipeline stage `{stage}` failed: {message}")]
    PipelineStage { stage: String, message: String },

    #[error("pipeline stage `{stage}` timed out after {timeout_secs}s")]
    PipelineStageTimeout { stage: String, timeout_secs: u64 },

    #[error("session {session_id} abandoned while waiting for the lock")]
    ConcurrencyAbandoned { session_id: String },

    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("fatal error: {message}")]
    Fatal { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    /// Wraps failures from `ai_session::ProcessHandle` (spawn, kill,
    /// wait), which reports over `anyhow`.
    #[error("process error: {0}")]
    Process(#[from] anyhow::Error),
}

impl BridgeError {
    /// Map this error onto the `session:halted` reason it should produce,
    /// if any. Errors that don't halt a session (e.g. `Validation`)
    /// return `None`.
    pub fn halt_reason(&self) -> Option<HaltReason> {
        match self {
            BridgeError::CliTimeout { .. } | BridgeError::PipelineStageTimeout { .. } => {
                Some(HaltReason::Timeout)
            }
            BridgeError::CliProcessExit { .. } => Some(HaltReason::ProcessExit),
            BridgeError::CliError { .. } | BridgeError::Process(_) => Some(HaltReason::CliError),
            _ => None,
        }
    }

    /// Whether the session can be resumed after this error (mirrors
    /// `session:halted.canResume`).
    pub fn can_resume(&self) -> bool {
        matches!(
            self,
            BridgeError::CliTimeout { .. } | BridgeError::CliProcessExit { .. }
        )
    }

    pub fn validation(message: impl Into<String>) -> Self {
        BridgeError::Validation {
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        BridgeError::Fatal {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
