//! Dispatch-level behavior of the message handler that doesn't require a
//! real backend process: unknown-session rejection, bridge registration
//! acks, human-input fulfilment, and `session:stop` rejecting queued
//! waiters fail-fast.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use agent_bridge::concurrency::ConcurrencyManager;
use agent_bridge::context_builder::ContextBuilder;
use agent_bridge::context_store::SessionContextStore;
use agent_bridge::error::Result;
use agent_bridge::events::{InboundEvent, OutboundEvent};
use agent_bridge::message_handler::{HumanInputWaiters, MessageHandler};
use agent_bridge::pool::AssistantPool;
use agent_bridge::socket::{SocketConnectionManager, Transport};

struct RecordingTransport {
    events: Mutex<Vec<OutboundEvent>>,
    sends: AtomicUsize,
}

impl RecordingTransport {
    fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            sends: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, event: &OutboundEvent) -> Result<()> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        self.events.lock().await.push(event.clone());
        Ok(())
    }
    async fn recv(&self) -> Result<Option<InboundEvent>> {
        Ok(None)
    }
}

fn handler(socket: Arc<SocketConnectionManager>) -> (MessageHandler, Arc<HumanInputWaiters>) {
    let sessions = Arc::new(SessionContextStore::new());
    let concurrency = Arc::new(ConcurrencyManager::new());
    let pool = Arc::new(AssistantPool::new());
    let context_builder = Arc::new(ContextBuilder::new("http://127.0.0.1:1"));
    let human_input = Arc::new(HumanInputWaiters::default());
    (
        MessageHandler::new(sessions, concurrency, pool, context_builder, socket, human_input.clone()),
        human_input,
    )
}

#[tokio::test]
async fn unseen_session_id_is_lazily_created_not_rejected() {
    // `getOrCreate` means a first message for an id the bridge has never
    // seen creates the session rather than erroring -- the server, not
    // the bridge, owns session identity. The turn still ends in a
    // `session:error` here because no real backend binary is on PATH in
    // this sandbox, but that is a CLI spawn failure, not an
    // unknown-session rejection.
    let socket = Arc::new(SocketConnectionManager::new());
    let transport = Arc::new(RecordingTransport::new());
    socket.register("bridge-1", transport.clone()).await;
    let (handler, _human_input) = handler(socket);

    handler
        .handle(InboundEvent::SessionMessage {
            session_id: "never-seen-before".to_string(),
            message_id: "m1".to_string(),
            content: "hi".to_string(),
        })
        .await;

    let events = transport.events.lock().await;
    assert!(events.iter().any(|e| matches!(e, OutboundEvent::SessionError { .. })));
}

#[tokio::test]
async fn bridge_register_is_acknowledged() {
    let socket = Arc::new(SocketConnectionManager::new());
    let transport = Arc::new(RecordingTransport::new());
    socket.register("bridge-1", transport.clone()).await;
    let (handler, _human_input) = handler(socket);

    handler
        .handle(InboundEvent::BridgeRegister {
            bridge_id: "bridge-1".to_string(),
        })
        .await;

    let events = transport.events.lock().await;
    assert_eq!(events.len(), 1);
    match &events[0] {
        OutboundEvent::BridgeRegisterAck { bridge_id, ok } => {
            assert_eq!(bridge_id, "bridge-1");
            assert!(*ok);
        }
        other => panic!("expected BridgeRegisterAck, got {other:?}"),
    }
}

#[tokio::test]
async fn human_input_response_fulfils_the_waiter() {
    let socket = Arc::new(SocketConnectionManager::new());
    let (handler, human_input) = handler(socket);

    let rx = human_input.register("req-1".to_string());
    handler
        .handle(InboundEvent::SessionHumanInputResponse {
            session_id: "s1".to_string(),
            request_id: "req-1".to_string(),
            response: serde_json::json!({"approved": true}),
        })
        .await;

    let value = rx.await.unwrap();
    assert_eq!(value, serde_json::json!({"approved": true}));
}

#[tokio::test]
async fn session_stop_clears_pending_waiters_fail_fast() {
    let socket = Arc::new(SocketConnectionManager::new());
    let concurrency = Arc::new(ConcurrencyManager::new());
    concurrency.acquire_lock("s1", "m1").await.unwrap();

    let concurrency2 = concurrency.clone();
    let waiter = tokio::spawn(async move { concurrency2.acquire_lock("s1", "m2").await });
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    let sessions = Arc::new(SessionContextStore::new());
    let pool = Arc::new(AssistantPool::new());
    let context_builder = Arc::new(ContextBuilder::new("http://127.0.0.1:1"));
    let human_input = Arc::new(HumanInputWaiters::default());
    let handler = MessageHandler::new(sessions, concurrency.clone(), pool, context_builder, socket, human_input);

    handler
        .handle(InboundEvent::SessionStop {
            session_id: "s1".to_string(),
        })
        .await;

    let result = waiter.await.unwrap();
    assert!(result.is_err());
}
