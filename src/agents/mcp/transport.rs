//! Transports for tool-source connections
//!
//! Stdio spawns a child process and speaks newline-delimited JSON-RPC on its
//! pipes; requests are serialized on the single connection. The sse and http
//! transports POST JSON-RPC to the configured URL, the former tolerating
//! SSE-framed response bodies.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::debug;

use super::McpError;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RpcResponse {
    #[serde(default)]
    pub id: Option<Value>,
    pub result: Option<Value>,
    pub error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RpcError {
    pub code: i64,
    pub message: String,
}

pub(super) enum Transport {
    Stdio(StdioTransport),
    Http(HttpTransport),
}

impl Transport {
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        match self {
            Transport::Stdio(t) => t.request(method, params).await,
            Transport::Http(t) => t.request(method, params).await,
        }
    }

    pub async fn notify(&self, method: &str) -> Result<(), McpError> {
        match self {
            Transport::Stdio(t) => t.notify(method).await,
            Transport::Http(t) => t.notify(method).await,
        }
    }

    pub async fn close(&self) {
        if let Transport::Stdio(t) = self {
            t.close().await;
        }
    }
}

/// Child-process transport. All pipe traffic goes through one mutex so
/// concurrent turns on the owning agent serialize their requests.
pub(super) struct StdioTransport {
    channel: Mutex<StdioChannel>,
    timeout: Duration,
}

struct StdioChannel {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

impl StdioTransport {
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self, McpError> {
        let mut child = Command::new(command)
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| McpError::Spawn(format!("{}: {}", command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Spawn("child stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Spawn("child stdout unavailable".to_string()))?;

        Ok(Self {
            channel: Mutex::new(StdioChannel {
                child,
                stdin,
                lines: BufReader::new(stdout).lines(),
                next_id: 0,
            }),
            timeout,
        })
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let mut channel = self.channel.lock().await;
        channel.next_id += 1;
        let id = channel.next_id;

        let payload = serde_json::to_string(&RpcRequest {
            jsonrpc: "2.0",
            id: Some(id),
            method,
            params,
        })
        .map_err(|e| McpError::Protocol(e.to_string()))?;

        channel.stdin.write_all(payload.as_bytes()).await?;
        channel.stdin.write_all(b"\n").await?;
        channel.stdin.flush().await?;

        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            let line = tokio::time::timeout_at(deadline, channel.lines.next_line())
                .await
                .map_err(|_| McpError::Timeout)??
                .ok_or(McpError::Closed)?;

            if line.trim().is_empty() {
                continue;
            }
            let Ok(response) = serde_json::from_str::<RpcResponse>(&line) else {
                debug!(line, "skipping unparseable tool-source output");
                continue;
            };
            // Server-initiated notifications and unrelated responses are skipped.
            if response.id != Some(json!(id)) {
                continue;
            }
            return unwrap_response(response);
        }
    }

    async fn notify(&self, method: &str) -> Result<(), McpError> {
        let mut channel = self.channel.lock().await;
        let payload = serde_json::to_string(&RpcRequest {
            jsonrpc: "2.0",
            id: None,
            method,
            params: None,
        })
        .map_err(|e| McpError::Protocol(e.to_string()))?;
        channel.stdin.write_all(payload.as_bytes()).await?;
        channel.stdin.write_all(b"\n").await?;
        channel.stdin.flush().await?;
        Ok(())
    }

    async fn close(&self) {
        let mut channel = self.channel.lock().await;
        let _ = channel.child.kill().await;
    }
}

/// HTTP POST transport used by both the `http` and `sse` source transports.
pub(super) struct HttpTransport {
    client: reqwest::Client,
    url: String,
    headers: Vec<(String, String)>,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(
        url: String,
        headers: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self, McpError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| McpError::Protocol(e.to_string()))?;

        Ok(Self {
            client,
            url,
            headers: headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            next_id: AtomicU64::new(0),
        })
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: Some(id),
            method,
            params,
        };

        let mut builder = self
            .client
            .post(&self.url)
            .header("Accept", "application/json, text/event-stream")
            .json(&request);
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(McpError::Protocol(format!(
                "{} returned {}: {}",
                self.url, status, body
            )));
        }

        unwrap_response(parse_rpc_body(&body)?)
    }

    async fn notify(&self, method: &str) -> Result<(), McpError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: None,
            method,
            params: None,
        };
        let mut builder = self.client.post(&self.url).json(&request);
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        let _ = builder.send().await?;
        Ok(())
    }
}

fn unwrap_response(response: RpcResponse) -> Result<Value, McpError> {
    if let Some(error) = response.error {
        return Err(McpError::Rpc {
            code: error.code,
            message: error.message,
        });
    }
    response
        .result
        .ok_or_else(|| McpError::Protocol("response carried neither result nor error".to_string()))
}

/// Accept either a plain JSON body or an SSE-framed one (`data:` lines).
pub(super) fn parse_rpc_body(body: &str) -> Result<RpcResponse, McpError> {
    let trimmed = body.trim_start();
    if trimmed.starts_with('{') {
        return serde_json::from_str(trimmed).map_err(|e| McpError::Protocol(e.to_string()));
    }

    for line in body.lines() {
        let Some(data) = line.trim_start().strip_prefix("data:") else {
            continue;
        };
        if let Ok(response) = serde_json::from_str::<RpcResponse>(data.trim()) {
            return Ok(response);
        }
    }

    Err(McpError::Protocol(
        "no JSON-RPC payload found in response body".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json_bodies() {
        let response =
            parse_rpc_body(r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[]}}"#).unwrap();
        assert!(response.result.is_some());
        assert!(response.error.is_none());
    }

    #[test]
    fn parses_sse_framed_bodies() {
        let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{\"ok\":true}}\n\n";
        let response = parse_rpc_body(body).unwrap();
        assert_eq!(response.id, Some(json!(2)));
        assert_eq!(response.result.unwrap()["ok"], true);
    }

    #[test]
    fn rejects_bodies_without_payload() {
        assert!(parse_rpc_body("event: ping\n\n").is_err());
    }
}
