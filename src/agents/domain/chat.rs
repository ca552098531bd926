//! Chat request/response types and the streamed chunk protocol

use std::collections::HashMap;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::agents::llm::TokenUsage;

use super::ToolCall;

/// Metadata key that triggers injection of the page-content tool.
pub const PAGE_CONTEXT_KEY: &str = "pageContext";

/// A single chat request to an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatInput {
    /// User message
    pub message: String,
    /// Opaque conversation correlation id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Opaque key-value bag; recognized keys may inject per-request tools
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl ChatInput {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            conversation_id: None,
            metadata: HashMap::new(),
        }
    }
}

/// Why a turn finished. `tool-calls` never surfaces here: intermediate
/// tool-call steps are consumed by the loop, and hitting the step cap is
/// reported as `steps`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatFinishReason {
    Stop,
    Length,
    ContentFilter,
    Steps,
}

/// Record of one tool invocation during a turn
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRecord {
    pub id: String,
    pub tool_name: String,
    pub args: Value,
    pub result: Value,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Final response from a non-streaming turn
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatOutput {
    pub text: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    pub finish_reason: ChatFinishReason,
}

/// A chunk of streamed output from an agent turn.
///
/// Stream invariants: at most one `finish`, emitted only with a reason other
/// than `tool-calls`; an `error` chunk terminates the stream with no `finish`
/// after it; every `tool-call` is later answered by a `tool-result` with the
/// same id or by an `error`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ChatChunk {
    Text {
        content: String,
    },
    ToolCall {
        id: String,
        name: String,
        args: Value,
    },
    ToolResult {
        id: String,
        result: Value,
    },
    Error {
        message: String,
    },
    Finish {
        finish_reason: ChatFinishReason,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
    },
}

impl ChatChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn tool_call(call: &ToolCall) -> Self {
        Self::ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            args: call.arguments.clone(),
        }
    }

    pub fn tool_result(id: impl Into<String>, result: Value) -> Self {
        Self::ToolResult {
            id: id.into(),
            result,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn finish(finish_reason: ChatFinishReason, usage: Option<TokenUsage>) -> Self {
        Self::Finish {
            finish_reason,
            usage,
        }
    }
}

/// Pull-based stream of chat chunks produced by a running turn
pub struct ChatStream {
    receiver: mpsc::Receiver<ChatChunk>,
}

impl ChatStream {
    /// Create a bounded channel pair for building a chat stream.
    pub fn channel(buffer: usize) -> (ChatStreamSender, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (ChatStreamSender { sender: tx }, Self { receiver: rx })
    }
}

impl Stream for ChatStream {
    type Item = ChatChunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_recv(cx)
    }
}

/// Sender half for building a chat stream
#[derive(Clone)]
pub struct ChatStreamSender {
    sender: mpsc::Sender<ChatChunk>,
}

impl ChatStreamSender {
    /// Send a chunk. A send error means the consumer went away and the
    /// producer should abandon the turn.
    pub async fn send(&self, chunk: ChatChunk) -> Result<(), mpsc::error::SendError<ChatChunk>> {
        self.sender.send(chunk).await
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
