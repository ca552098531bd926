//! A2A task executor
//!
//! Creates, tracks, streams, cancels and garbage-collects background agent
//! executions. Task records live in memory only; transitions go through a
//! compare-and-set gate so an observer never sees the state machine regress.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{SystemTime, UNIX_EPOCH};

use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agents::domain::{CancelToken, ChatChunk, ChatInput, ChatOutput};
use crate::agents::error::{AgentError, AgentResult};
use crate::agents::registry::AgentRegistry;

use super::task::{A2aStreamEvent, A2aTask, TaskStatus};

/// Default retention for terminal tasks before GC removes them.
pub const DEFAULT_TASK_RETENTION_MS: u64 = 60 * 60 * 1000;

struct TaskEntry {
    task: A2aTask,
    cancel: CancelToken,
}

/// Owner of all A2A task records
pub struct TaskExecutor {
    registry: Arc<AgentRegistry>,
    tasks: RwLock<HashMap<String, TaskEntry>>,
}

impl TaskExecutor {
    pub fn new(registry: Arc<AgentRegistry>) -> Arc<Self> {
        Arc::new(Self {
            registry,
            tasks: RwLock::new(HashMap::new()),
        })
    }

    /// Create a task for an agent turn and schedule its background
    /// execution. Fails when the agent path is unknown.
    pub async fn create_task(
        self: &Arc<Self>,
        agent_path: &str,
        message: &str,
        context_id: Option<String>,
    ) -> AgentResult<A2aTask> {
        if !self.registry.has(agent_path).await {
            return Err(AgentError::NotFound(agent_path.to_string()));
        }

        let now = now_millis();
        let task = A2aTask {
            task_id: Uuid::new_v4().to_string(),
            context_id,
            agent_path: agent_path.to_string(),
            message: message.to_string(),
            status: TaskStatus::Pending,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        };

        let task_id = task.task_id.clone();
        self.tasks.write().await.insert(
            task_id.clone(),
            TaskEntry {
                task: task.clone(),
                cancel: CancelToken::new(),
            },
        );

        let executor = Arc::clone(self);
        tokio::spawn(async move {
            executor.run_background(task_id).await;
        });

        info!(task = %task.task_id, agent = %task.agent_path, "a2a task created");
        Ok(task)
    }

    async fn run_background(self: Arc<Self>, task_id: String) {
        let Some((agent_path, message, context_id, cancel)) = self.snapshot(&task_id).await else {
            return;
        };

        // A cancel that lands before this point wins the CAS.
        if !self.transition(&task_id, TaskStatus::InProgress).await {
            return;
        }

        let mut input = ChatInput::new(message);
        input.conversation_id = context_id;

        let outcome = match self.registry.get(&agent_path).await {
            Ok(agent) => agent.execute(input, cancel).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(output) => {
                self.complete_with(&task_id, output).await;
            }
            Err(AgentError::Cancelled) => {
                debug!(task = %task_id, "background execution cancelled");
            }
            Err(e) => {
                self.fail_with(&task_id, e.to_string()).await;
            }
        }
    }

    /// Run the agent's streaming execute for a task, emitting events as
    /// chunks arrive. The streamed execution drives its own transitions
    /// through the same state machine.
    pub async fn stream_task(self: &Arc<Self>, task_id: &str) -> AgentResult<A2aEventStream> {
        if !self.tasks.read().await.contains_key(task_id) {
            return Err(AgentError::Task(format!("unknown task '{}'", task_id)));
        }

        let (sender, stream) = A2aEventStream::channel(64);
        let executor = Arc::clone(self);
        let task_id = task_id.to_string();

        tokio::spawn(async move {
            executor.run_stream(task_id, sender).await;
        });

        Ok(stream)
    }

    async fn run_stream(self: Arc<Self>, task_id: String, sender: A2aEventSender) {
        let Some((agent_path, message, context_id, cancel)) = self.snapshot(&task_id).await else {
            let _ = sender
                .send(A2aStreamEvent::error(&task_id, "task disappeared"))
                .await;
            return;
        };

        // The first event is always status(in_progress).
        if sender
            .send(A2aStreamEvent::status(&task_id, TaskStatus::InProgress))
            .await
            .is_err()
        {
            return;
        }
        self.transition(&task_id, TaskStatus::InProgress).await;

        let agent = match self.registry.get(&agent_path).await {
            Ok(agent) => agent,
            Err(e) => {
                self.fail_with(&task_id, e.to_string()).await;
                let _ = sender
                    .send(A2aStreamEvent::error(&task_id, e.to_string()))
                    .await;
                return;
            }
        };

        let mut input = ChatInput::new(message);
        input.conversation_id = context_id;

        let mut chunks = agent.execute_stream(input, cancel.clone());
        let mut text = String::new();

        while let Some(chunk) = chunks.next().await {
            match chunk {
                ChatChunk::Text { content } => {
                    text.push_str(&content);
                    if sender
                        .send(A2aStreamEvent::text(&task_id, content))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                ChatChunk::ToolCall { .. } | ChatChunk::ToolResult { .. } => {
                    // Tool traffic stays internal to the turn.
                }
                ChatChunk::Error { message } => {
                    if !cancel.is_cancelled() {
                        self.fail_with(&task_id, message.clone()).await;
                    }
                    let _ = sender
                        .send(A2aStreamEvent::error(&task_id, message))
                        .await;
                    return;
                }
                ChatChunk::Finish {
                    finish_reason,
                    usage,
                } => {
                    let output = ChatOutput {
                        text: text.clone(),
                        tool_calls: Vec::new(),
                        usage,
                        finish_reason,
                    };
                    self.complete_with(&task_id, output).await;

                    let _ = sender
                        .send(A2aStreamEvent::artifact(&task_id, text.clone()))
                        .await;
                    let final_status = self.status_of(&task_id).await.unwrap_or(TaskStatus::Completed);
                    let _ = sender
                        .send(A2aStreamEvent::complete(&task_id, final_status))
                        .await;
                    return;
                }
            }
        }

        // Producer went away without a terminal chunk.
        self.fail_with(&task_id, "stream ended unexpectedly".to_string())
            .await;
        let _ = sender
            .send(A2aStreamEvent::error(&task_id, "stream ended unexpectedly"))
            .await;
    }

    /// Look up a task by id.
    pub async fn get_task(&self, task_id: &str) -> AgentResult<A2aTask> {
        self.tasks
            .read()
            .await
            .get(task_id)
            .map(|entry| entry.task.clone())
            .ok_or_else(|| AgentError::TaskNotFound(task_id.to_string()))
    }

    /// All tasks, optionally filtered by agent path. Order is unspecified.
    pub async fn list_tasks(&self, agent_path: Option<&str>) -> Vec<A2aTask> {
        self.tasks
            .read()
            .await
            .values()
            .filter(|entry| agent_path.map_or(true, |p| entry.task.agent_path == p))
            .map(|entry| entry.task.clone())
            .collect()
    }

    /// Request cancellation. Returns whether it took effect; a task already
    /// in a terminal state is left untouched.
    pub async fn cancel_task(&self, task_id: &str) -> AgentResult<bool> {
        let mut tasks = self.tasks.write().await;
        let entry = tasks
            .get_mut(task_id)
            .ok_or_else(|| AgentError::TaskNotFound(task_id.to_string()))?;

        if !entry.task.status.can_transition_to(TaskStatus::Cancelled) {
            return Ok(false);
        }

        entry.task.status = TaskStatus::Cancelled;
        entry.task.updated_at = entry.task.updated_at.max(now_millis());
        entry.cancel.cancel();
        info!(task = %task_id, "a2a task cancelled");
        Ok(true)
    }

    /// Remove completed and failed tasks older than `max_age_ms`. Cancelled
    /// tasks are retained. Returns the number of tasks deleted.
    pub async fn cleanup_old_tasks(&self, max_age_ms: u64) -> usize {
        let now = now_millis();
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, entry| {
            let expired = matches!(
                entry.task.status,
                TaskStatus::Completed | TaskStatus::Failed
            ) && now.saturating_sub(entry.task.updated_at) >= max_age_ms;
            !expired
        });
        let removed = before - tasks.len();
        if removed > 0 {
            info!(removed, "a2a task GC removed old tasks");
        }
        removed
    }

    async fn snapshot(
        &self,
        task_id: &str,
    ) -> Option<(String, String, Option<String>, CancelToken)> {
        self.tasks.read().await.get(task_id).map(|entry| {
            (
                entry.task.agent_path.clone(),
                entry.task.message.clone(),
                entry.task.context_id.clone(),
                entry.cancel.clone(),
            )
        })
    }

    async fn status_of(&self, task_id: &str) -> Option<TaskStatus> {
        self.tasks
            .read()
            .await
            .get(task_id)
            .map(|entry| entry.task.status)
    }

    /// Compare-and-set transition; illegal moves are rejected.
    async fn transition(&self, task_id: &str, next: TaskStatus) -> bool {
        let mut tasks = self.tasks.write().await;
        let Some(entry) = tasks.get_mut(task_id) else {
            return false;
        };
        if !entry.task.status.can_transition_to(next) {
            debug!(
                task = %task_id,
                from = ?entry.task.status,
                to = ?next,
                "rejected illegal task transition"
            );
            return false;
        }
        entry.task.status = next;
        entry.task.updated_at = entry.task.updated_at.max(now_millis());
        true
    }

    async fn complete_with(&self, task_id: &str, output: ChatOutput) -> bool {
        let mut tasks = self.tasks.write().await;
        let Some(entry) = tasks.get_mut(task_id) else {
            return false;
        };
        if !entry.task.status.can_transition_to(TaskStatus::Completed) {
            return false;
        }
        entry.task.status = TaskStatus::Completed;
        entry.task.result = Some(output);
        entry.task.updated_at = entry.task.updated_at.max(now_millis());
        true
    }

    async fn fail_with(&self, task_id: &str, error: String) -> bool {
        let mut tasks = self.tasks.write().await;
        let Some(entry) = tasks.get_mut(task_id) else {
            return false;
        };
        if !entry.task.status.can_transition_to(TaskStatus::Failed) {
            return false;
        }
        warn!(task = %task_id, error = %error, "a2a task failed");
        entry.task.status = TaskStatus::Failed;
        entry.task.error = Some(error);
        entry.task.updated_at = entry.task.updated_at.max(now_millis());
        true
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Pull-based stream of task events
#[derive(Debug)]
pub struct A2aEventStream {
    receiver: mpsc::Receiver<A2aStreamEvent>,
}

impl A2aEventStream {
    pub fn channel(buffer: usize) -> (A2aEventSender, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (A2aEventSender { sender: tx }, Self { receiver: rx })
    }
}

impl Stream for A2aEventStream {
    type Item = A2aStreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_recv(cx)
    }
}

/// Sender half for building a task event stream
#[derive(Clone)]
pub struct A2aEventSender {
    sender: mpsc::Sender<A2aStreamEvent>,
}

impl A2aEventSender {
    pub async fn send(
        &self,
        event: A2aStreamEvent,
    ) -> Result<(), mpsc::error::SendError<A2aStreamEvent>> {
        self.sender.send(event).await
    }
}
