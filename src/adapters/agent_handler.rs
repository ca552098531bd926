//! Agent endpoints: listing, summaries, chat and chat streaming

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::agents::domain::{CancelToken, ChatChunk, ChatInput};
use crate::agents::registry::AgentSummary;

use super::api_error::ApiError;
use super::{AppState, SseEventStream};

pub async fn list_agents(State(state): State<AppState>) -> Json<Value> {
    let agents = state.registry.list().await;
    Json(json!({ "agents": agents }))
}

pub async fn get_agent(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<AgentSummary>, ApiError> {
    let config = state.registry.get_config(&path).await?;
    Ok(Json(AgentSummary {
        path: config.path,
        id: config.id,
        name: config.name,
        description: config.description,
    }))
}

pub async fn chat(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Json(input): Json<ChatInput>,
) -> Result<Json<Value>, ApiError> {
    let trace_id = Uuid::new_v4().to_string();
    validate_input(&input).map_err(|e| e.with_trace(trace_id.clone()))?;

    let agent = state
        .registry
        .get(&path)
        .await
        .map_err(|e| ApiError::from(e).with_trace(trace_id.clone()))?;

    let output = agent
        .execute(input, CancelToken::new())
        .await
        .map_err(|e| ApiError::from(e).with_trace(trace_id.clone()))?;

    Ok(Json(json!({
        "success": true,
        "data": output,
        "traceId": trace_id,
    })))
}

/// Streamed chat: an SSE frame per chat chunk, bracketed by
/// `{type:"start",traceId}` and `{type:"done"}` (or a final
/// `{type:"error",content}`).
pub async fn chat_stream(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Json(input): Json<ChatInput>,
) -> Result<Sse<SseEventStream>, ApiError> {
    let trace_id = Uuid::new_v4().to_string();
    validate_input(&input).map_err(|e| e.with_trace(trace_id.clone()))?;

    let agent = state
        .registry
        .get(&path)
        .await
        .map_err(|e| ApiError::from(e).with_trace(trace_id.clone()))?;

    let cancel = CancelToken::new();
    let mut chunks = agent.execute_stream(input, cancel.clone());

    let (tx, stream) = SseEventStream::channel(64);
    tokio::spawn(async move {
        let start = json!({ "type": "start", "traceId": trace_id }).to_string();
        if tx.send(Ok(Event::default().data(start))).await.is_err() {
            cancel.cancel();
            return;
        }

        while let Some(chunk) = chunks.next().await {
            let errored = matches!(chunk, ChatChunk::Error { .. });
            let frame = match &chunk {
                ChatChunk::Error { message } => {
                    json!({ "type": "error", "content": message }).to_string()
                }
                other => serde_json::to_string(other).unwrap_or_default(),
            };

            if tx.send(Ok(Event::default().data(frame))).await.is_err() {
                // Client went away; abort the turn at its next check.
                cancel.cancel();
                debug!("chat stream consumer disconnected");
                return;
            }
            if errored {
                return;
            }
        }

        let done = json!({ "type": "done" }).to_string();
        let _ = tx.send(Ok(Event::default().data(done))).await;
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn validate_input(input: &ChatInput) -> Result<(), ApiError> {
    if input.message.trim().is_empty() {
        return Err(ApiError::validation("message must not be empty")
            .with_details(json!({ "field": "message" })));
    }
    Ok(())
}
