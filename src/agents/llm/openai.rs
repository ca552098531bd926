//! OpenAI-compatible chat-completions provider with streaming support
//!
//! Works against any endpoint speaking the chat-completions wire format
//! (hosted OpenAI, vLLM, llama.cpp server, LiteLLM proxies).

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::{
    CompletionRequest, CompletionResponse, FinishReason, LlmProvider, LlmStream, LlmStreamSender,
    StreamChunk, TokenUsage, ToolCallDelta,
};
use crate::agents::config::ProviderEndpoint;
use crate::agents::domain::{Message, Role, ToolCall};
use crate::agents::error::{LlmError, LlmResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Provider for OpenAI-compatible endpoints
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    extra_headers: Vec<(String, String)>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiCompatProvider {
    pub fn new(
        model: String,
        temperature: f32,
        max_tokens: u32,
        endpoint: &ProviderEndpoint,
    ) -> LlmResult<Self> {
        if endpoint.base_url.trim().is_empty() {
            return Err(LlmError::InvalidRequest(
                "providerConfig.baseUrl must not be empty".to_string(),
            ));
        }

        let extra_headers = endpoint
            .headers
            .clone()
            .unwrap_or_default()
            .into_iter()
            .collect();

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            api_key: endpoint.api_key.clone(),
            extra_headers,
            model,
            temperature,
            max_tokens,
        })
    }

    fn request_builder(&self, streaming: bool) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Content-Type", "application/json");

        if !streaming {
            builder = builder.timeout(REQUEST_TIMEOUT);
        }
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }
        for (name, value) in &self.extra_headers {
            builder = builder.header(name, value);
        }

        builder
    }

    fn build_request_body(&self, request: &CompletionRequest, streaming: bool) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": convert_messages(&request.messages),
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        if !request.tools.is_empty() {
            body["tools"] = json!(request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": normalize_parameters(&t.parameters),
                        }
                    })
                })
                .collect::<Vec<_>>());
        }

        if streaming {
            body["stream"] = json!(true);
            body["stream_options"] = json!({ "include_usage": true });
        }

        body
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> LlmResult<CompletionResponse> {
        let body = self.build_request_body(&request, false);
        let response = self.request_builder(false).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(format!("failed to parse response: {}", e)))?;

        parse_response(parsed)
    }

    fn complete_stream(&self, request: CompletionRequest) -> LlmStream {
        let (sender, stream) = LlmStream::channel(64);

        let body = self.build_request_body(&request, true);
        let builder = self.request_builder(true).json(&body);

        tokio::spawn(async move {
            if let Err(e) = stream_completion(builder, sender.clone()).await {
                let _ = sender.send_error(e).await;
            }
        });

        stream
    }
}

async fn stream_completion(builder: reqwest::RequestBuilder, sender: LlmStreamSender) -> LlmResult<()> {
    let response = builder.send().await?;

    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(LlmError::Api {
            status: status.as_u16(),
            message,
        });
    }

    let mut bytes = response.bytes_stream();
    let mut buffer = String::new();

    while let Some(part) = bytes.next().await {
        let part = part.map_err(|e| LlmError::Streaming(e.to_string()))?;
        buffer.push_str(&String::from_utf8_lossy(&part));

        while let Some(pos) = buffer.find('\n') {
            let line = buffer[..pos].trim().to_string();
            buffer.drain(..pos + 1);

            let Some(data) = line.strip_prefix("data: ") else {
                continue;
            };
            if data == "[DONE]" {
                return Ok(());
            }

            let Ok(parsed) = serde_json::from_str::<ChatStreamResponse>(data) else {
                continue;
            };

            let mut chunk = StreamChunk::default();

            if let Some(choice) = parsed.choices.first() {
                if let Some(content) = &choice.delta.content {
                    chunk.content.push_str(content);
                }

                if let Some(tool_calls) = &choice.delta.tool_calls {
                    for tc in tool_calls {
                        let mut delta = ToolCallDelta::new(tc.index);
                        if let Some(id) = &tc.id {
                            delta = delta.with_id(id);
                        }
                        if let Some(func) = &tc.function {
                            if let Some(name) = &func.name {
                                delta = delta.with_name(name);
                            }
                            if let Some(args) = &func.arguments {
                                delta = delta.with_arguments(args);
                            }
                        }
                        chunk.tool_calls.push(delta);
                    }
                }

                if let Some(reason) = &choice.finish_reason {
                    chunk.finish_reason = Some(map_finish_reason(reason));
                }
            }

            if let Some(usage) = &parsed.usage {
                chunk.usage = Some(usage.to_usage());
            }

            if sender.send(chunk).await.is_err() {
                return Ok(()); // receiver dropped
            }
        }
    }

    Ok(())
}

/// The wire format requires parameters to be a schema object; tools whose
/// descriptors omitted one get an empty object schema.
fn normalize_parameters(parameters: &Value) -> Value {
    match parameters.as_object() {
        Some(obj) if !obj.is_empty() => {
            if obj.contains_key("type") {
                parameters.clone()
            } else {
                let mut patched = obj.clone();
                patched.insert("type".to_string(), json!("object"));
                Value::Object(patched)
            }
        }
        _ => json!({ "type": "object", "properties": {} }),
    }
}

fn convert_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| {
            let mut msg = json!({
                "role": match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                },
                "content": m.content,
            });

            if let Some(tool_calls) = &m.tool_calls {
                msg["tool_calls"] = json!(tool_calls
                    .iter()
                    .map(|tc| {
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.name,
                                "arguments": serde_json::to_string(&tc.arguments)
                                    .unwrap_or_default(),
                            }
                        })
                    })
                    .collect::<Vec<_>>());
            }

            if let Some(id) = &m.tool_call_id {
                msg["tool_call_id"] = json!(id);
            }
            if let Some(name) = &m.name {
                msg["name"] = json!(name);
            }

            msg
        })
        .collect()
}

fn parse_response(response: ChatResponse) -> LlmResult<CompletionResponse> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::Parse("no choices in response".to_string()))?;

    let tool_calls: Vec<ToolCall> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| ToolCall {
            id: tc.id,
            name: tc.function.name,
            arguments: serde_json::from_str(&tc.function.arguments)
                .unwrap_or(Value::Object(Default::default())),
        })
        .collect();

    let content = choice.message.content.unwrap_or_default();
    let message = if tool_calls.is_empty() {
        Message::assistant(content)
    } else {
        Message::assistant_with_tools(content, tool_calls)
    };

    let finish_reason = map_finish_reason(choice.finish_reason.as_deref().unwrap_or("stop"));

    Ok(CompletionResponse {
        message,
        finish_reason,
        usage: response.usage.as_ref().map(UsageBlock::to_usage),
    })
}

fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "length" => FinishReason::Length,
        "tool_calls" => FinishReason::ToolCalls,
        "content_filter" => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

// Wire types

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<UsageBlock>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct UsageBlock {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl UsageBlock {
    fn to_usage(&self) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens: self.total_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatStreamResponse {
    choices: Vec<StreamChoice>,
    usage: Option<UsageBlock>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCall {
    index: usize,
    id: Option<String>,
    function: Option<StreamFunction>,
}

#[derive(Debug, Deserialize)]
struct StreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_missing_parameter_schemas() {
        let fixed = normalize_parameters(&Value::Null);
        assert_eq!(fixed["type"], "object");

        let fixed = normalize_parameters(&json!({ "properties": { "q": { "type": "string" } } }));
        assert_eq!(fixed["type"], "object");
        assert!(fixed["properties"]["q"].is_object());

        let untouched = json!({ "type": "object", "properties": {} });
        assert_eq!(normalize_parameters(&untouched), untouched);
    }
}
