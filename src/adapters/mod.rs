//! HTTP adapters: handlers, error envelope, shared state

pub mod a2a_handler;
pub mod agent_handler;
pub mod api_error;
pub mod discovery_handler;
pub mod health_handler;

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::response::sse::Event;
use futures::Stream;
use tokio::sync::mpsc;

use crate::agents::a2a::TaskExecutor;
use crate::agents::registry::AgentRegistry;
use crate::config::Settings;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<AgentRegistry>,
    pub executor: Arc<TaskExecutor>,
    pub settings: Arc<Settings>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        registry: Arc<AgentRegistry>,
        executor: Arc<TaskExecutor>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            registry,
            executor,
            settings,
            started_at: Instant::now(),
        }
    }
}

/// Channel-backed stream of SSE events; producers run in a spawned task and
/// observe client disconnects as send errors.
pub struct SseEventStream {
    receiver: mpsc::Receiver<Result<Event, Infallible>>,
}

impl SseEventStream {
    pub fn channel(buffer: usize) -> (mpsc::Sender<Result<Event, Infallible>>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { receiver: rx })
    }
}

impl Stream for SseEventStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_recv(cx)
    }
}
