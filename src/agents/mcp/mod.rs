//! Tool-source client
//!
//! One long-lived connection per source configured on an agent. The client
//! performs the protocol handshake on connect and exposes `list_tools` /
//! `call_tool`; translation into internal tools happens in
//! [`crate::agents::tools::translate_tool`].

mod transport;

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::agents::config::{ToolSourceConfig, ToolTransport};

use transport::{HttpTransport, StdioTransport, Transport};

const PROTOCOL_VERSION: &str = "2024-11-05";

/// Errors from tool-source connections
#[derive(Debug, Error)]
pub enum McpError {
    #[error("failed to spawn tool source: {0}")]
    Spawn(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("tool source error [{code}]: {message}")]
    Rpc { code: i64, message: String },

    #[error("tool source request timed out")]
    Timeout,

    #[error("tool source connection closed")]
    Closed,
}

/// A tool as described by its source
#[derive(Debug, Clone, Deserialize)]
pub struct McpToolDescriptor {
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "inputSchema")]
    pub input_schema: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ListToolsResult {
    tools: Vec<McpToolDescriptor>,
}

#[derive(Debug, Deserialize)]
struct CallToolResult {
    #[serde(default)]
    content: Vec<ContentItem>,
    #[serde(rename = "isError")]
    is_error: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ContentItem {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

/// Long-lived connection to one external tool provider
pub struct ToolSourceClient {
    id: String,
    transport: Transport,
}

impl ToolSourceClient {
    /// Open the connection described by the config and perform the
    /// initialize handshake.
    pub async fn connect(config: &ToolSourceConfig) -> Result<Self, McpError> {
        let timeout = Duration::from_secs(config.timeout_seconds);

        let transport = match config.transport {
            ToolTransport::Stdio => {
                let command = config
                    .command
                    .as_deref()
                    .ok_or_else(|| McpError::Spawn("stdio source has no command".to_string()))?;
                Transport::Stdio(
                    StdioTransport::spawn(command, &config.args, &config.env, timeout).await?,
                )
            }
            ToolTransport::Sse | ToolTransport::Http => {
                let url = config
                    .url
                    .clone()
                    .ok_or_else(|| McpError::Protocol("source has no url".to_string()))?;
                Transport::Http(HttpTransport::new(url, &config.headers, timeout)?)
            }
        };

        let client = Self {
            id: config.id.clone(),
            transport,
        };

        client
            .transport
            .request(
                "initialize",
                Some(json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "clientInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                    "capabilities": {},
                })),
            )
            .await?;
        client.transport.notify("notifications/initialized").await?;

        debug!(source = %client.id, "tool source connected");
        Ok(client)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Fetch the source's advertised tools.
    pub async fn list_tools(&self) -> Result<Vec<McpToolDescriptor>, McpError> {
        let result = self.transport.request("tools/list", None).await?;
        let parsed: ListToolsResult =
            serde_json::from_value(result).map_err(|e| McpError::Protocol(e.to_string()))?;
        Ok(parsed.tools)
    }

    /// Invoke a tool by its source-side name. A source-flagged error
    /// propagates as an ordinary call failure.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, McpError> {
        let result = self
            .transport
            .request(
                "tools/call",
                Some(json!({ "name": name, "arguments": arguments })),
            )
            .await?;

        let parsed: CallToolResult =
            serde_json::from_value(result).map_err(|e| McpError::Protocol(e.to_string()))?;

        let output = join_text_content(&parsed.content);

        if parsed.is_error.unwrap_or(false) {
            return Err(McpError::Rpc {
                code: -1,
                message: if output.is_empty() {
                    format!("tool '{}' reported an error", name)
                } else {
                    output
                },
            });
        }

        if output.is_empty() {
            Ok(Value::Null)
        } else {
            Ok(Value::String(output))
        }
    }

    /// Close the connection. Safe to call more than once.
    pub async fn close(&self) {
        self.transport.close().await;
    }
}

fn join_text_content(content: &[ContentItem]) -> String {
    let mut output = String::new();
    for item in content {
        if item.content_type == "text" {
            if let Some(text) = &item.text {
                if !output.is_empty() {
                    output.push('\n');
                }
                output.push_str(text);
            }
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_only_text_items() {
        let result: CallToolResult = serde_json::from_value(serde_json::json!({
            "content": [
                { "type": "text", "text": "first" },
                { "type": "image", "data": "aGk=" },
                { "type": "text", "text": "second" }
            ]
        }))
        .unwrap();

        assert_eq!(join_text_content(&result.content), "first\nsecond");
        assert!(!result.is_error.unwrap_or(false));
    }

    #[test]
    fn source_error_flag_is_parsed() {
        let result: CallToolResult = serde_json::from_value(serde_json::json!({
            "content": [{ "type": "text", "text": "boom" }],
            "isError": true
        }))
        .unwrap();

        assert!(result.is_error.unwrap_or(false));
        assert_eq!(join_text_content(&result.content), "boom");
    }
}
