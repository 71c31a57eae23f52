//! `CliSession`: owns one spawned backend process for the duration of a
//! single turn, grounded on `direct_cli.rs`'s `spawn_cli_process` /
//! `process_cli_output` pair and `ai-session`'s process/line-reader
//! primitives.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use ai_session::{spawn_line_reader, ProcessHandle};
use tokio::io::AsyncWriteExt;

use crate::backend::{BackendKind, CliBackend, SpawnContext, StreamMessage};
use crate::error::{BridgeError, Result};

const STDERR_RING_CAP: usize = 50;
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// A single spawned backend process, streaming [`StreamMessage`]s for one
/// turn until it reports completion, times out, or exits.
pub struct CliSession {
    session_id: String,
    backend: BackendKind,
    working_dir: PathBuf,
    process: ProcessHandle,
    stderr_tail: VecDeque<String>,
}

impl CliSession {
    /// Spawn the backend's process for one turn. `message` is delivered
    /// either positionally (embedded by `build_argv`) or over stdin,
    /// depending on `descriptor.format_input`.
    #[allow(clippy::too_many_arguments)]
    pub async fn spawn(
        session_id: String,
        backend: BackendKind,
        working_dir: PathBuf,
        message: &str,
        resume_backend_session_id: Option<&str>,
        system_prompt: Option<&str>,
        allowed_tools: &[String],
    ) -> Result<Self> {
        let descriptor = backend.descriptor();
        let ctx = SpawnContext {
            message,
            resume_backend_session_id,
            system_prompt,
            allowed_tools,
        };

        let argv = descriptor.build_argv(&ctx);
        let env = descriptor.build_env(&ctx);
        let mut process = ProcessHandle::spawn(descriptor.binary(), &argv, &working_dir, &env)?;

        if let Some(input) = descriptor.format_input(&ctx) {
            if let Some(mut stdin) = process.take_stdin() {
                stdin.write_all(input.as_bytes()).await?;
                stdin.shutdown().await?;
            }
        }

        Ok(Self {
            session_id,
            backend,
            working_dir,
            process,
            stderr_tail: VecDeque::with_capacity(STDERR_RING_CAP),
        })
    }

    pub fn working_dir(&self) -> &PathBuf {
        &self.working_dir
    }

    /// Stream the turn to completion, applying `timeout_secs` (defaults to
    /// 120s per spec) to the whole read loop. Returns every parsed
    /// message in order.
    pub async fn stream_turn(&mut self, timeout_secs: Option<u64>) -> Result<Vec<StreamMessage>> {
        let timeout = Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
        match tokio::time::timeout(timeout, self.read_until_complete()).await {
            Ok(result) => result,
            Err(_) => {
                let _ = self.process.kill().await;
                Err(BridgeError::CliTimeout {
                    backend: self.backend.descriptor().name().to_string(),
                    session_id: self.session_id.clone(),
                    timeout_secs: timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
                })
            }
        }
    }

    async fn read_until_complete(&mut self) -> Result<Vec<StreamMessage>> {
        let descriptor = self.backend.descriptor();
        let stdout = self
            .process
            .take_stdout()
            .ok_or_else(|| BridgeError::fatal("stdout already taken"))?;
        let stderr = self
            .process
            .take_stderr()
            .ok_or_else(|| BridgeError::fatal("stderr already taken"))?;

        let mut stdout_rx = spawn_line_reader(stdout);
        let mut stderr_rx = spawn_line_reader(stderr);

        let mut messages = Vec::new();
        loop {
            tokio::select! {
                line = stdout_rx.recv() => {
                    match line {
                        Some(line) => {
                            let parsed = descriptor.parse_line(&line);
                            let done = descriptor.is_complete(&parsed);
                            messages.extend(parsed);
                            if done {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                line = stderr_rx.recv() => {
                    match line {
                        Some(line) => {
                            if self.stderr_tail.len() >= STDERR_RING_CAP {
                                self.stderr_tail.pop_front();
                            }
                            self.stderr_tail.push_back(line);
                        }
                        None => {}
                    }
                }
            }
        }

        // Drain whatever is left so we don't block the reader tasks.
        while stderr_rx.try_recv().is_ok() {}

        if !descriptor.is_complete(&messages) {
            let status = self.process.wait().await?;
            if !status.success() {
                return Err(BridgeError::CliProcessExit {
                    backend: descriptor.name().to_string(),
                    session_id: self.session_id.clone(),
                    status: format!("{status:?}"),
                    stderr_tail: self.stderr_tail.iter().cloned().collect(),
                });
            }
        }

        Ok(messages)
    }

    pub async fn close(&mut self) -> Result<()> {
        if self.process.is_running() {
            self.process.kill().await?;
        }
        Ok(())
    }
}

impl Drop for CliSession {
    /// Best-effort safety net for a session dropped without going through
    /// `close()` -- `ProcessHandle::kill` is async and unavailable here, so
    /// this only starts the kill and does not wait for exit.
    fn drop(&mut self) {
        if self.process.is_running() {
            tracing::warn!(
                session_id = %self.session_id,
                "CliSession dropped with its process still running; force-killing"
            );
            let _ = self.process.start_kill();
        }
    }
}
