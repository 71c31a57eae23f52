//! A handle around a spawned child process.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

/// A running (or exited) child process along with its piped handles.
pub struct ProcessHandle {
    child: Child,
}

impl ProcessHandle {
    /// Spawn `command` with `args` in `working_dir`, with stdin, stdout and
    /// stderr all piped, and `env` merged on top of the inherited
    /// environment.
    pub fn spawn(
        command: &str,
        args: &[String],
        working_dir: &Path,
        env: &HashMap<String, String>,
    ) -> Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .current_dir(working_dir)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn `{command}`"))?;

        Ok(Self { child })
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    pub async fn kill(&mut self) -> Result<()> {
        self.child.kill().await.context("failed to kill process")
    }

    /// Send a kill signal without waiting for the process to exit. For use
    /// from synchronous contexts (e.g. a `Drop` impl) where `kill`'s async
    /// wait can't run.
    pub fn start_kill(&mut self) -> Result<()> {
        self.child
            .start_kill()
            .context("failed to start killing process")
    }

    pub async fn wait(&mut self) -> Result<std::process::ExitStatus> {
        self.child.wait().await.context("failed to wait on process")
    }
}
