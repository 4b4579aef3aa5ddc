//! REST API server for the board intelligence agent
//!
//! Exposes the orchestrator over HTTP: a blocking chat endpoint, an
//! SSE streaming variant, and board health probes for the frontend.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::agent::Orchestrator;
use crate::board::BoardClient;
use crate::error::AgentError;
use crate::config::Config;
use crate::models::{AgentEvent, ChatRequest, ChatResponse, HealthResponse};
use crate::session::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub sessions: Arc<dyn SessionStore>,
    pub board_client: Arc<BoardClient>,
    pub config: Arc<Config>,
}

fn stable_uuid_from_string(input: &str) -> uuid::Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    uuid::Uuid::from_bytes(bytes)
}

/// Resolve the conversation id for a request. A valid UUID passes
/// through, any other non-empty string maps to a stable UUID, and a
/// missing id starts a fresh conversation.
fn resolve_conversation_id(requested: Option<&str>) -> String {
    match requested {
        Some(v) if !v.trim().is_empty() => uuid::Uuid::parse_str(v)
            .unwrap_or_else(|_| stable_uuid_from_string(v))
            .to_string(),
        _ => uuid::Uuid::new_v4().to_string(),
    }
}

//
// ================= Chat =================
//

async fn chat_handler(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    if req.message.trim().is_empty() {
        let err = AgentError::InvalidRequest("message must not be empty".to_string());
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": err.to_string() })),
        );
    }

    let conversation_id = resolve_conversation_id(req.conversation_id.as_deref());
    info!(%conversation_id, "chat request received");

    let history = state.sessions.history(&conversation_id).await;

    match state.orchestrator.run_turn(history, &req.message, None).await {
        Ok(outcome) => {
            state
                .sessions
                .replace(&conversation_id, outcome.messages)
                .await;

            let response = ChatResponse {
                response: outcome.response,
                traces: outcome.traces,
                caveats: outcome.caveats,
                conversation_id,
            };
            match serde_json::to_value(&response) {
                Ok(body) => (StatusCode::OK, Json(body)),
                Err(e) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": e.to_string() })),
                ),
            }
        }
        Err(e) => {
            error!(%conversation_id, error = %e, "turn failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
        }
    }
}

async fn chat_stream_handler(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let conversation_id = resolve_conversation_id(req.conversation_id.as_deref());
    info!(%conversation_id, "streaming chat request received");

    let (tx, rx) = mpsc::channel::<AgentEvent>(32);

    tokio::spawn(async move {
        let _ = tx
            .send(AgentEvent::Session {
                conversation_id: conversation_id.clone(),
            })
            .await;

        if req.message.trim().is_empty() {
            let _ = tx
                .send(AgentEvent::Error {
                    message: "message must not be empty".to_string(),
                })
                .await;
            return;
        }

        let history = state.sessions.history(&conversation_id).await;

        match state
            .orchestrator
            .run_turn(history, &req.message, Some(&tx))
            .await
        {
            Ok(outcome) => {
                state
                    .sessions
                    .replace(&conversation_id, outcome.messages)
                    .await;
                let _ = tx.send(AgentEvent::Done).await;
            }
            Err(e) => {
                error!(%conversation_id, error = %e, "streaming turn failed");
                let _ = tx.send(e.into()).await;
            }
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| Event::default().json_data(&event));

    Sse::new(stream).keep_alive(KeepAlive::default())
}

//
// ================= Health =================
//

async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (deals, workorders) = tokio::join!(
        state.board_client.check_connection(&state.config.deals_board_id),
        state
            .board_client
            .check_connection(&state.config.workorders_board_id),
    );

    let connected = [deals.connected, workorders.connected]
        .iter()
        .filter(|c| **c)
        .count();
    let (status, code) = match connected {
        2 => ("ok", StatusCode::OK),
        1 => ("degraded", StatusCode::OK),
        _ => ("unhealthy", StatusCode::SERVICE_UNAVAILABLE),
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            deals_board: Some(deals),
            workorders_board: Some(workorders),
        }),
    )
}

async fn boards_status_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let (deals, workorders) = tokio::join!(
        state.board_client.check_connection(&state.config.deals_board_id),
        state
            .board_client
            .check_connection(&state.config.workorders_board_id),
    );

    Json(serde_json::json!({
        "deals": deals,
        "work_orders": workorders,
    }))
}

//
// ================= Router =================
//

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/stream", post(chat_stream_handler))
        .route("/api/health", get(health_handler))
        .route("/api/boards/status", get(boards_status_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub async fn start_server(
    state: AppState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_uuid_passes_through() {
        let id = "4b2d9f6e-0b1a-4d6c-9c3a-1f2e3d4c5b6a";
        assert_eq!(resolve_conversation_id(Some(id)), id);
    }

    #[test]
    fn arbitrary_strings_map_to_a_stable_uuid() {
        let a = resolve_conversation_id(Some("my-session"));
        let b = resolve_conversation_id(Some("my-session"));
        assert_eq!(a, b);
        assert!(uuid::Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn missing_id_starts_a_fresh_conversation() {
        let a = resolve_conversation_id(None);
        let b = resolve_conversation_id(None);
        assert_ne!(a, b);
    }
}
