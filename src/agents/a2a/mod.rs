//! Agent-to-agent task protocol: asynchronous, observable agent turns

mod executor;
mod task;

pub use executor::{A2aEventSender, A2aEventStream, TaskExecutor, DEFAULT_TASK_RETENTION_MS};
pub use task::{A2aEventKind, A2aStreamEvent, A2aTask, TaskStatus};
