//! Plain configuration structs. Loading them from files or environment
//! variables is out of scope for this crate; callers hand already-built
//! values to [`crate::supervisor::BridgeSupervisor`].

use std::collections::HashMap;
use std::path::PathBuf;

use crate::backend::BackendKind;
use serde::{Deserialize, Serialize};

/// Per-session configuration handed down from the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub backend: BackendKind,
    pub working_directory: PathBuf,
    pub resume_backend_session_id: Option<String>,
    pub system_prompt: Option<String>,
    pub allowed_tools: Vec<String>,
    pub extra_env: HashMap<String, String>,
}

impl SessionConfig {
    pub fn new(backend: BackendKind, working_directory: PathBuf) -> Self {
        Self {
            backend,
            working_directory,
            resume_backend_session_id: None,
            system_prompt: None,
            allowed_tools: Vec::new(),
            extra_env: HashMap::new(),
        }
    }
}

/// Bridge-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub bridge_id: String,
    pub http_bind: String,
    /// WebSocket URL of the server the bridge connects out to as a
    /// client, with infinite reconnect.
    pub server_url: String,
    pub heartbeat_interval_secs: u64,
    /// Base URL the context builder fetches entity data from for full
    /// context injection.
    pub entity_api_base: String,
    /// When true, missing backend credentials are a hard startup error
    /// rather than a warning.
    pub container_mode: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bridge_id: uuid::Uuid::new_v4().to_string(),
            http_bind: "127.0.0.1:8787".to_string(),
            server_url: "ws://127.0.0.1:9000/bridge".to_string(),
            heartbeat_interval_secs: 30,
            entity_api_base: "http://127.0.0.1:9000/api/entities".to_string(),
            container_mode: false,
        }
    }
}
