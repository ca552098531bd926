//! # Aviary - multi-tenant agent hosting service
//!
//! A single process exposing an HTTP API over a registry of declaratively
//! configured conversational agents. Each agent binds a backing LLM provider,
//! a system prompt, external tool sources, an optional retrieval policy and
//! optional delegation targets; chat requests run through a bounded
//! tool-calling loop and stream back to clients. A peer agent-to-agent (A2A)
//! protocol exposes the same turns as observable background tasks.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use aviary::agents::a2a::TaskExecutor;
//! use aviary::agents::registry::AgentRegistry;
//! use aviary::config::Settings;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Arc::new(Settings::default());
//!     let registry = AgentRegistry::new(settings.clone());
//!     registry.load_all(&settings.agents_dir).await?;
//!     let executor = TaskExecutor::new(registry.clone());
//!     let state = aviary::adapters::AppState::new(registry, executor, settings);
//!     let app = aviary::create_app(state);
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod agents;
pub mod cli;
pub mod config;

use axum::routing::{get, post};
use axum::Router;

use crate::adapters::{a2a_handler, agent_handler, discovery_handler, health_handler, AppState};

/// Build the application router with all endpoints configured.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        // Agent surface
        .route("/agents", get(agent_handler::list_agents))
        .route("/agents/:path", get(agent_handler::get_agent))
        .route("/agents/:path/chat", post(agent_handler::chat))
        .route("/agents/:path/stream", post(agent_handler::chat_stream))
        // Health
        .route("/health", get(health_handler::health))
        .route("/health/ready", get(health_handler::ready))
        .route("/health/live", get(health_handler::live))
        // Discovery cards
        .route(
            "/.well-known/agent.json",
            get(discovery_handler::service_card),
        )
        .route(
            "/.well-known/agents/:path/agent.json",
            get(discovery_handler::agent_card),
        )
        // A2A task protocol
        .route(
            "/a2a/tasks",
            post(a2a_handler::create_task).get(a2a_handler::list_tasks),
        )
        .route("/a2a/tasks/:id", get(a2a_handler::get_task))
        .route("/a2a/tasks/:id/cancel", post(a2a_handler::cancel_task))
        .route("/a2a/tasks/:id/stream", get(a2a_handler::stream_task))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}
