//! Streaming types for LLM responses

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::agents::domain::ToolCall;
use crate::agents::error::LlmError;

use super::{FinishReason, TokenUsage};

/// A chunk of streamed LLM response
#[derive(Debug, Clone, Default)]
pub struct StreamChunk {
    /// Delta content (text being generated)
    pub content: String,
    /// Tool call deltas (partial or complete)
    pub tool_calls: Vec<ToolCallDelta>,
    /// Finish reason, present on the final chunk
    pub finish_reason: Option<FinishReason>,
    /// Token usage, usually only on the final chunk
    pub usage: Option<TokenUsage>,
}

/// Delta update for a tool call being streamed
#[derive(Debug, Clone)]
pub struct ToolCallDelta {
    /// Index of the tool call being updated
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    /// Arguments JSON fragment, accumulated across deltas
    pub arguments: Option<String>,
}

impl ToolCallDelta {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            id: None,
            name: None,
            arguments: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_arguments(mut self, args: impl Into<String>) -> Self {
        self.arguments = Some(args.into());
        self
    }
}

/// Accumulates streamed deltas into complete tool calls
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    building: Vec<PartialCall>,
}

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_delta(&mut self, delta: &ToolCallDelta) {
        while self.building.len() <= delta.index {
            self.building.push(PartialCall::default());
        }

        let partial = &mut self.building[delta.index];
        if let Some(id) = &delta.id {
            partial.id.push_str(id);
        }
        if let Some(name) = &delta.name {
            partial.name.push_str(name);
        }
        if let Some(args) = &delta.arguments {
            partial.arguments.push_str(args);
        }
    }

    /// Build the finished tool calls, dropping incomplete entries.
    pub fn build(self) -> Vec<ToolCall> {
        self.building
            .into_iter()
            .filter(|p| !p.id.is_empty() && !p.name.is_empty())
            .map(|p| ToolCall {
                id: p.id,
                name: p.name,
                arguments: serde_json::from_str(&p.arguments)
                    .unwrap_or(Value::Object(Default::default())),
            })
            .collect()
    }
}

/// Streaming response from an LLM provider
pub struct LlmStream {
    receiver: mpsc::Receiver<Result<StreamChunk, LlmError>>,
}

impl LlmStream {
    /// Create a bounded channel pair for building an LLM stream.
    pub fn channel(buffer: usize) -> (LlmStreamSender, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (LlmStreamSender { sender: tx }, Self { receiver: rx })
    }
}

impl Stream for LlmStream {
    type Item = Result<StreamChunk, LlmError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_recv(cx)
    }
}

/// Sender half for building an LLM stream
#[derive(Clone)]
pub struct LlmStreamSender {
    sender: mpsc::Sender<Result<StreamChunk, LlmError>>,
}

impl LlmStreamSender {
    pub async fn send(
        &self,
        chunk: StreamChunk,
    ) -> Result<(), mpsc::error::SendError<Result<StreamChunk, LlmError>>> {
        self.sender.send(Ok(chunk)).await
    }

    pub async fn send_error(
        &self,
        error: LlmError,
    ) -> Result<(), mpsc::error::SendError<Result<StreamChunk, LlmError>>> {
        self.sender.send(Err(error)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_split_deltas_in_index_order() {
        let mut acc = ToolCallAccumulator::new();
        acc.apply_delta(&ToolCallDelta::new(0).with_id("call_").with_name("ask"));
        acc.apply_delta(&ToolCallDelta::new(0).with_id("1").with_name("Sales"));
        acc.apply_delta(&ToolCallDelta::new(0).with_arguments(r#"{"message":"#));
        acc.apply_delta(&ToolCallDelta::new(0).with_arguments(r#""hi"}"#));

        let calls = acc.build();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].name, "askSales");
        assert_eq!(calls[0].arguments["message"], "hi");
    }

    #[test]
    fn drops_incomplete_calls_and_bad_json() {
        let mut acc = ToolCallAccumulator::new();
        acc.apply_delta(&ToolCallDelta::new(0).with_arguments("{}"));
        acc.apply_delta(
            &ToolCallDelta::new(1)
                .with_id("call_2")
                .with_name("lookup")
                .with_arguments("not json"),
        );

        let calls = acc.build();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "lookup");
        assert!(calls[0].arguments.as_object().unwrap().is_empty());
    }
}
