//! `AssistantPool`: a registry of live [`CliSession`]s keyed by session
//! id, grounded on `subagent/spawner.rs`'s `DynamicSpawner` (parallel
//! cleanup via `join_all`).

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::Mutex;

use crate::backend::BackendKind;
use crate::cli_session::CliSession;
use crate::error::Result;

#[derive(Default)]
pub struct AssistantPool {
    sessions: DashMap<String, Arc<Mutex<CliSession>>>,
}

impl AssistantPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a new backend process for `session_id`'s current turn. Any
    /// prior `CliSession` registered under the same id is closed first so
    /// its process is never orphaned.
    #[allow(clippy::too_many_arguments)]
    pub async fn spawn(
        &self,
        session_id: &str,
        backend: BackendKind,
        working_dir: PathBuf,
        message: &str,
        resume_backend_session_id: Option<&str>,
        system_prompt: Option<&str>,
        allowed_tools: &[String],
    ) -> Result<Arc<Mutex<CliSession>>> {
        if let Some(prior) = self.sessions.get(session_id) {
            let mut prior = prior.lock().await;
            let _ = prior.close().await;
        }

        let cli = CliSession::spawn(
            session_id.to_string(),
            backend,
            working_dir,
            message,
            resume_backend_session_id,
            system_prompt,
            allowed_tools,
        )
        .await?;
        let handle = Arc::new(Mutex::new(cli));
        self.sessions.insert(session_id.to_string(), handle.clone());
        Ok(handle)
    }

    /// Close and remove the session registered under `session_id`, if
    /// any. Used on pipeline failure so stale line buffers from a killed
    /// child can never contaminate the next turn.
    pub async fn close(&self, session_id: &str) {
        if let Some((_, handle)) = self.sessions.remove(session_id) {
            let mut session = handle.lock().await;
            let _ = session.close().await;
        }
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Mutex<CliSession>>> {
        self.sessions.get(session_id).map(|e| e.value().clone())
    }

    pub fn remove(&self, session_id: &str) -> Option<Arc<Mutex<CliSession>>> {
        self.sessions.remove(session_id).map(|(_, v)| v)
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Close every live session in parallel. Used during bridge shutdown.
    pub async fn cleanup(&self) {
        let handles: Vec<_> = self.sessions.iter().map(|e| e.value().clone()).collect();
        self.sessions.clear();
        join_all(handles.into_iter().map(|h| async move {
            let mut session = h.lock().await;
            let _ = session.close().await;
        }))
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_against_a_missing_binary_leaves_the_pool_empty() {
        let pool = AssistantPool::new();
        // `claude` isn't on PATH in this sandbox, so the spawn itself
        // fails; the pool must not register a handle for a session whose
        // process never started.
        let result = pool
            .spawn(
                "s1",
                BackendKind::Claude,
                PathBuf::from("."),
                "hi",
                None,
                None,
                &[],
            )
            .await;
        assert!(result.is_err());
        assert_eq!(pool.active_count(), 0);
    }

    #[tokio::test]
    async fn close_on_an_unknown_session_is_a_no_op() {
        let pool = AssistantPool::new();
        pool.close("does-not-exist").await;
        assert_eq!(pool.active_count(), 0);
    }
}
