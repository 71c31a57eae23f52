//! Bridge supervisor (C11): wires the pool, the message handler and the
//! HTTP health/debug surface together; opens the outbound socket
//! connection to the server with infinite reconnect; runs the 30s
//! heartbeat; and drives graceful shutdown. Grounded on
//! `crates/ccswarm/src/ipc/server.rs`'s `start_ipc_server` background-task
//! pattern for the HTTP/heartbeat tasks, and on
//! `other_examples/.../socket_bridge.rs`'s reconnect-with-backoff loop for
//! the server connection.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::concurrency::ConcurrencyManager;
use crate::config::BridgeConfig;
use crate::context_builder::ContextBuilder;
use crate::context_store::SessionContextStore;
use crate::events::OutboundEvent;
use crate::http::{build_router, HttpState};
use crate::message_handler::{HumanInputWaiters, MessageHandler};
use crate::pool::AssistantPool;
use crate::socket::{SocketConnectionManager, WebSocketTransport};

/// Delay between reconnect attempts to the server.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

pub struct BridgeSupervisor {
    config: BridgeConfig,
    sessions: Arc<SessionContextStore>,
    concurrency: Arc<ConcurrencyManager>,
    pool: Arc<AssistantPool>,
    context_builder: Arc<ContextBuilder>,
    socket: Arc<SocketConnectionManager>,
    human_input: Arc<HumanInputWaiters>,
    shutdown: CancellationToken,
}

impl BridgeSupervisor {
    pub fn new(
        config: BridgeConfig,
        sessions: Arc<SessionContextStore>,
        concurrency: Arc<ConcurrencyManager>,
        socket: Arc<SocketConnectionManager>,
        human_input: Arc<HumanInputWaiters>,
    ) -> Self {
        let context_builder = Arc::new(ContextBuilder::new(config.entity_api_base.clone()));
        Self {
            config,
            sessions,
            concurrency,
            pool: Arc::new(AssistantPool::new()),
            context_builder,
            socket,
            human_input,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Close every live CLI process. Called during shutdown so a bridge
    /// restart never leaves orphaned children behind.
    pub async fn cleanup_pool(&self) {
        self.pool.cleanup().await;
    }

    /// Start the HTTP server, the server-connection loop, and the
    /// heartbeat loop in the background. Returns once all three are
    /// spawned; cancel the token from [`BridgeSupervisor::shutdown_handle`]
    /// to stop them.
    pub async fn start(&mut self) -> anyhow::Result<(JoinHandle<()>, JoinHandle<()>, JoinHandle<()>)> {
        let http_state = Arc::new(HttpState {
            sessions: self.sessions.clone(),
            human_input: self.human_input.clone(),
            start_time: Instant::now(),
        });
        let router = build_router(http_state);
        let listener = tokio::net::TcpListener::bind(&self.config.http_bind).await?;
        tracing::info!(bind = %self.config.http_bind, "bridge HTTP surface listening");

        let http_shutdown = self.shutdown.clone();
        let http_handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router);
            tokio::select! {
                result = serve => {
                    if let Err(err) = result {
                        tracing::error!(error = %err, "HTTP server exited with error");
                    }
                }
                _ = http_shutdown.cancelled() => {
                    tracing::info!("HTTP surface shutting down");
                }
            }
        });

        let socket = self.socket.clone();
        let concurrency = self.concurrency.clone();
        let interval_secs = self.config.heartbeat_interval_secs;
        let heartbeat_shutdown = self.shutdown.clone();
        let heartbeat_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let active_message_ids = concurrency.active_message_ids().await;
                        let _ = socket
                            .send(&OutboundEvent::BridgeHeartbeat { active_message_ids })
                            .await;
                    }
                    _ = heartbeat_shutdown.cancelled() => {
                        tracing::info!("heartbeat loop shutting down");
                        break;
                    }
                }
            }
        });

        let handler = Arc::new(MessageHandler::new(
            self.sessions.clone(),
            self.concurrency.clone(),
            self.pool.clone(),
            self.context_builder.clone(),
            self.socket.clone(),
            self.human_input.clone(),
        ));
        let connect_handle = tokio::spawn(run_connection_loop(
            self.config.server_url.clone(),
            self.config.bridge_id.clone(),
            self.socket.clone(),
            handler,
            self.shutdown.clone(),
        ));

        Ok((http_handle, heartbeat_handle, connect_handle))
    }
}

/// Connects to the server over WebSocket with infinite reconnect,
/// registering the transport and dispatching every inbound event to
/// `handler` until the connection drops, then retrying after
/// `RECONNECT_DELAY`.
async fn run_connection_loop(
    server_url: String,
    bridge_id: String,
    socket: Arc<SocketConnectionManager>,
    handler: Arc<MessageHandler>,
    shutdown: CancellationToken,
) {
    'reconnect: loop {
        if shutdown.is_cancelled() {
            return;
        }

        let connected = tokio::select! {
            _ = shutdown.cancelled() => return,
            result = tokio_tungstenite::connect_async(&server_url) => result,
        };

        let stream = match connected {
            Ok((stream, _response)) => stream,
            Err(err) => {
                tracing::warn!(error = %err, server_url = %server_url, "failed to connect to server, retrying");
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                }
                continue 'reconnect;
            }
        };

        tracing::info!(server_url = %server_url, "connected to server");
        let transport = Arc::new(WebSocketTransport::new(stream));
        socket.register(bridge_id.clone(), transport.clone()).await;
        let _ = socket
            .send(&OutboundEvent::BridgeRegisterAck {
                bridge_id: bridge_id.clone(),
                ok: true,
            })
            .await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                received = transport.recv() => {
                    match received {
                        Ok(Some(event)) => handler.handle(event).await,
                        Ok(None) => {
                            tracing::warn!("server connection closed, reconnecting");
                            socket.disconnect().await;
                            continue 'reconnect;
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "transport error, reconnecting");
                            socket.disconnect().await;
                            continue 'reconnect;
                        }
                    }
                }
            }
        }
    }
}
