//! The HTTP surface (spec.md §6): health, debug snapshot/logs, and the
//! human-input route. Grounded directly on `crates/ccswarm/src/ipc/server.rs`'s
//! `IpcServer::build_router`/`IpcState` shape.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::context_store::SessionContextStore;
use crate::message_handler::HumanInputWaiters;

pub struct HttpState {
    pub sessions: Arc<SessionContextStore>,
    pub human_input: Arc<HumanInputWaiters>,
    pub start_time: Instant,
}

pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/sessions/:id/human-input", post(human_input_handler))
        .route("/debug/sessions/:id/context", get(debug_context_handler))
        .route("/debug/sessions/:id/logs", get(debug_logs_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_sessions: usize,
}

async fn health_handler(State(state): State<Arc<HttpState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.start_time.elapsed().as_secs(),
        active_sessions: state.sessions.len(),
    })
}

#[derive(Debug, Deserialize)]
struct HumanInputRequest {
    request_id: String,
    response: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct HumanInputResponse {
    fulfilled: bool,
}

async fn human_input_handler(
    State(state): State<Arc<HttpState>>,
    Path(_session_id): Path<String>,
    Json(body): Json<HumanInputRequest>,
) -> Json<HumanInputResponse> {
    let fulfilled = state.human_input.fulfil(&body.request_id, body.response);
    Json(HumanInputResponse { fulfilled })
}

async fn debug_context_handler(
    State(state): State<Arc<HttpState>>,
    Path(session_id): Path<String>,
) -> Result<Json<crate::session::SessionContextSnapshot>, axum::http::StatusCode> {
    state
        .sessions
        .snapshot(&session_id)
        .await
        .map(Json)
        .ok_or(axum::http::StatusCode::NOT_FOUND)
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct LogsResponse {
    events: Vec<crate::session::SessionEvent>,
}

async fn debug_logs_handler(
    State(state): State<Arc<HttpState>>,
    Path(session_id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<LogsResponse>, axum::http::StatusCode> {
    let snapshot = state
        .sessions
        .snapshot(&session_id)
        .await
        .ok_or(axum::http::StatusCode::NOT_FOUND)?;
    let limit = query.limit.unwrap_or(snapshot.events.len());
    let events = snapshot
        .events
        .into_iter()
        .rev()
        .take(limit)
        .rev()
        .collect();
    Ok(Json(LogsResponse { events }))
}
