use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use agent_bridge::backend::{BackendKind, CredentialStatus};
use agent_bridge::concurrency::ConcurrencyManager;
use agent_bridge::config::BridgeConfig;
use agent_bridge::context_store::SessionContextStore;
use agent_bridge::message_handler::HumanInputWaiters;
use agent_bridge::socket::SocketConnectionManager;
use agent_bridge::supervisor::BridgeSupervisor;

#[derive(Parser, Debug)]
#[command(name = "agent-bridge", about = "Bridges a server to CLI coding agents")]
struct Cli {
    /// Address to bind the bridge's HTTP surface to.
    #[arg(long, default_value = "127.0.0.1:8787")]
    http_bind: String,

    /// WebSocket URL of the server to connect out to.
    #[arg(long, default_value = "ws://127.0.0.1:9000/bridge")]
    server_url: String,

    /// Heartbeat interval in seconds.
    #[arg(long, default_value_t = 30)]
    heartbeat_interval_secs: u64,

    /// Treat missing backend credentials as a hard error instead of a
    /// warning.
    #[arg(long)]
    container_mode: bool,

    /// Verbosity, e.g. "info", "debug", "agent_bridge=debug".
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Warn (or, in container mode, hard-error) about backends whose
/// credentials aren't present, per spec.md §6.
fn check_credentials(container_mode: bool) -> anyhow::Result<()> {
    let home_dir = dirs::home_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
    let env: std::collections::HashMap<String, String> = std::env::vars().collect();

    for backend in [
        BackendKind::Claude,
        BackendKind::Gemini,
        BackendKind::Codex,
        BackendKind::Ollama,
    ] {
        let descriptor = backend.descriptor();
        if descriptor.credential_status(&home_dir, &env) == CredentialStatus::Missing {
            if container_mode {
                anyhow::bail!("missing credentials for backend `{}`", descriptor.name());
            }
            tracing::warn!(backend = descriptor.name(), "missing credentials");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false).compact();
    tracing_subscriber::registry().with(filter).with(fmt_layer).init();

    let config = BridgeConfig {
        http_bind: cli.http_bind,
        server_url: cli.server_url,
        heartbeat_interval_secs: cli.heartbeat_interval_secs,
        container_mode: cli.container_mode,
        ..BridgeConfig::default()
    };

    check_credentials(config.container_mode)?;

    let sessions = Arc::new(SessionContextStore::new());
    let concurrency = Arc::new(ConcurrencyManager::new());
    let socket = Arc::new(SocketConnectionManager::new());
    let human_input = Arc::new(HumanInputWaiters::default());

    let mut supervisor = BridgeSupervisor::new(
        config,
        sessions.clone(),
        concurrency.clone(),
        socket.clone(),
        human_input.clone(),
    );
    let (http_handle, heartbeat_handle, connect_handle) = supervisor.start().await?;

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
        }
        _ = sigterm.recv() => {
            tracing::info!("received sigterm, shutting down");
        }
        result = http_handle => {
            if let Err(err) = result {
                tracing::error!(error = %err, "HTTP task panicked");
            }
        }
    }

    supervisor.shutdown_handle().cancel();
    supervisor.cleanup_pool().await;
    socket.disconnect().await;

    let drain = async {
        let _ = heartbeat_handle.await;
        let _ = connect_handle.await;
    };
    if tokio::time::timeout(std::time::Duration::from_secs(5), drain)
        .await
        .is_err()
    {
        tracing::warn!("shutdown tasks did not finish within 5s, forcing exit");
        std::process::exit(1);
    }

    Ok(())
}
