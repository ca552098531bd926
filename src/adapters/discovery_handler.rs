//! Well-known discovery card endpoints

use axum::extract::{Path, State};
use axum::Json;

use crate::agents::discovery::{self, AgentCard, ServiceCard};
use crate::agents::error::AgentError;

use super::api_error::ApiError;
use super::AppState;

pub async fn service_card(State(state): State<AppState>) -> Json<ServiceCard> {
    let configs = state.registry.configs().await;
    Json(discovery::service_card(&configs, &state.settings))
}

pub async fn agent_card(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<AgentCard>, ApiError> {
    let configs = state.registry.configs().await;
    discovery::agent_card(&configs, &path, &state.settings)
        .map(Json)
        .ok_or_else(|| ApiError::from(AgentError::NotFound(path)))
}
