//! A2A task endpoints

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::agents::a2a::A2aTask;

use super::api_error::ApiError;
use super::{AppState, SseEventStream};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub agent_path: String,
    pub message: String,
    #[serde(default)]
    pub context_id: Option<String>,
    /// Accepted and ignored; reserved for protocol extensions
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTasksQuery {
    pub agent_path: Option<String>,
}

pub async fn create_task(
    State(state): State<AppState>,
    Json(request): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if request.message.trim().is_empty() {
        return Err(ApiError::validation("message must not be empty")
            .with_details(json!({ "field": "message" })));
    }

    let task = state
        .executor
        .create_task(&request.agent_path, &request.message, request.context_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "taskId": task.task_id,
            "status": task.status,
            "createdAt": task.created_at,
        })),
    ))
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListTasksQuery>,
) -> Json<Value> {
    let tasks = state
        .executor
        .list_tasks(query.agent_path.as_deref())
        .await;
    Json(json!({ "tasks": tasks }))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<A2aTask>, ApiError> {
    Ok(Json(state.executor.get_task(&task_id).await?))
}

pub async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let cancelled = state.executor.cancel_task(&task_id).await?;
    let task = state.executor.get_task(&task_id).await?;
    Ok(Json(json!({
        "taskId": task.task_id,
        "cancelled": cancelled,
        "status": task.status,
    })))
}

pub async fn stream_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Sse<SseEventStream>, ApiError> {
    let mut events = state.executor.stream_task(&task_id).await?;

    let (tx, stream) = SseEventStream::channel(64);
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let frame = serde_json::to_string(&event).unwrap_or_default();
            if tx.send(Ok(Event::default().data(frame))).await.is_err() {
                return;
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
