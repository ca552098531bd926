//! A2A task records and the task state machine

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::agents::domain::ChatOutput;

/// Lifecycle state of an A2A task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    InputRequired,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Legal transitions of the task state machine. `cancelled` is reachable
    /// only from `pending` and `in_progress`; terminal states never move.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (Pending, InProgress) | (Pending, Cancelled) => true,
            (InProgress, Completed)
            | (InProgress, Failed)
            | (InProgress, Cancelled)
            | (InProgress, InputRequired) => true,
            (InputRequired, InProgress)
            | (InputRequired, Completed)
            | (InputRequired, Failed) => true,
            _ => false,
        }
    }
}

/// A client-observable background execution of an agent turn
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct A2aTask {
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    pub agent_path: String,
    pub message: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ChatOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Unix epoch milliseconds; immutable after creation
    pub created_at: u64,
    /// Unix epoch milliseconds; advances on every status change
    pub updated_at: u64,
}

/// One event on an A2A task stream
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct A2aStreamEvent {
    #[serde(rename = "type")]
    pub kind: A2aEventKind,
    pub task_id: String,
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum A2aEventKind {
    Status,
    Text,
    Artifact,
    Error,
    Complete,
}

impl A2aStreamEvent {
    pub fn status(task_id: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            kind: A2aEventKind::Status,
            task_id: task_id.into(),
            data: json!({ "status": status }),
        }
    }

    pub fn text(task_id: impl Into<String>, delta: impl Into<String>) -> Self {
        Self {
            kind: A2aEventKind::Text,
            task_id: task_id.into(),
            data: Value::String(delta.into()),
        }
    }

    pub fn artifact(task_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: A2aEventKind::Artifact,
            task_id: task_id.into(),
            data: json!({ "text": text.into() }),
        }
    }

    pub fn error(task_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: A2aEventKind::Error,
            task_id: task_id.into(),
            data: Value::String(message.into()),
        }
    }

    pub fn complete(task_id: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            kind: A2aEventKind::Complete,
            task_id: task_id.into(),
            data: json!({ "status": status }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TaskStatus::*;
    use super::*;

    #[test]
    fn terminal_states_never_move() {
        for terminal in [Completed, Failed, Cancelled] {
            for next in [Pending, InProgress, Completed, Failed, Cancelled, InputRequired] {
                assert!(!terminal.can_transition_to(next), "{:?} -> {:?}", terminal, next);
            }
        }
    }

    #[test]
    fn cancellation_only_before_terminal() {
        assert!(Pending.can_transition_to(Cancelled));
        assert!(InProgress.can_transition_to(Cancelled));
        assert!(!InputRequired.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(Cancelled));
    }

    #[test]
    fn happy_path_is_legal() {
        assert!(Pending.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Completed));
    }

    #[test]
    fn statuses_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(
            serde_json::to_string(&InputRequired).unwrap(),
            "\"input_required\""
        );
    }
}
