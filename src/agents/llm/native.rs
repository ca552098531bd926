//! Native generative-language provider with streaming support

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::env;
use std::time::Duration;

use super::{
    CompletionRequest, CompletionResponse, FinishReason, LlmProvider, LlmStream, LlmStreamSender,
    StreamChunk, TokenUsage, ToolCallDelta,
};
use crate::agents::domain::{Message, Role, ToolCall};
use crate::agents::error::{LlmError, LlmResult};
use crate::config::NativeLlmSettings;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Provider for the native generative-language API
pub struct NativeProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl NativeProvider {
    pub fn new(
        model: String,
        temperature: f32,
        max_tokens: u32,
        settings: &NativeLlmSettings,
    ) -> LlmResult<Self> {
        let api_key = settings
            .api_key
            .clone()
            .or_else(|| env::var("GEMINI_API_KEY").ok())
            .ok_or_else(|| {
                LlmError::Authentication(
                    "native provider API key not configured (llm.native.apiKey or GEMINI_API_KEY)"
                        .to_string(),
                )
            })?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model,
            temperature,
            max_tokens,
        })
    }

    fn build_request_body(&self, request: &CompletionRequest) -> Value {
        let (system_instruction, contents) = convert_messages(&request.messages);

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_tokens,
            },
        });

        if let Some(system) = system_instruction {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }

        if !request.tools.is_empty() {
            body["tools"] = json!([{
                "functionDeclarations": request.tools.iter().map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    })
                }).collect::<Vec<_>>()
            }]);
        }

        body
    }

    fn parse_response(&self, response: &GenerateResponse) -> LlmResult<CompletionResponse> {
        let candidate = response
            .candidates
            .first()
            .ok_or_else(|| LlmError::Parse("no candidates in response".to_string()))?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();

        if let Some(parts) = candidate.content.as_ref().and_then(|c| c.parts.as_ref()) {
            for (index, part) in parts.iter().enumerate() {
                if let Some(text) = &part.text {
                    content.push_str(text);
                }
                if let Some(call) = &part.function_call {
                    tool_calls.push(ToolCall {
                        id: format!("call_{}", index),
                        name: call.name.clone(),
                        arguments: call.args.clone().unwrap_or(Value::Object(Default::default())),
                    });
                }
            }
        }

        let finish_reason = if tool_calls.is_empty() {
            map_finish_reason(candidate.finish_reason.as_deref())
        } else {
            FinishReason::ToolCalls
        };

        let message = if tool_calls.is_empty() {
            Message::assistant(content)
        } else {
            Message::assistant_with_tools(content, tool_calls)
        };

        Ok(CompletionResponse {
            message,
            finish_reason,
            usage: response.usage_metadata.as_ref().map(UsageMetadata::to_usage),
        })
    }
}

#[async_trait]
impl LlmProvider for NativeProvider {
    fn name(&self) -> &str {
        "native"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> LlmResult<CompletionResponse> {
        let body = self.build_request_body(&request);
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let response = self
            .client
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(format!("failed to parse response: {}", e)))?;

        self.parse_response(&parsed)
    }

    fn complete_stream(&self, request: CompletionRequest) -> LlmStream {
        let (sender, stream) = LlmStream::channel(64);

        let client = self.client.clone();
        let url = format!(
            "{}/models/{}:streamGenerateContent?key={}&alt=sse",
            self.base_url, self.model, self.api_key
        );
        let body = self.build_request_body(&request);

        tokio::spawn(async move {
            if let Err(e) = stream_completion(client, url, body, sender.clone()).await {
                let _ = sender.send_error(e).await;
            }
        });

        stream
    }
}

async fn stream_completion(
    client: reqwest::Client,
    url: String,
    body: Value,
    sender: LlmStreamSender,
) -> LlmResult<()> {
    let response = client
        .post(&url)
        .header("Content-Type", "application/json")
        .json(&body)
        .send()
        .await?;

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
    let mut tool_call_index = 0usize;

    while let Some(part) = bytes.next().await {
        let part = part.map_err(|e| LlmError::Streaming(e.to_string()))?;
        buffer.push_str(&String::from_utf8_lossy(&part));

        while let Some(pos) = buffer.find('\n') {
            let line = buffer[..pos].trim().to_string();
            buffer.drain(..pos + 1);

            let Some(data) = line.strip_prefix("data: ") else {
                continue;
            };

            let Ok(parsed) = serde_json::from_str::<GenerateResponse>(data) else {
                continue;
            };

            let mut chunk = StreamChunk::default();

            if let Some(candidate) = parsed.candidates.first() {
                if let Some(parts) = candidate.content.as_ref().and_then(|c| c.parts.as_ref()) {
                    for part in parts {
                        if let Some(text) = &part.text {
                            chunk.content.push_str(text);
                        }
                        if let Some(call) = &part.function_call {
                            let args = serde_json::to_string(
                                call.args.as_ref().unwrap_or(&Value::Null),
                            )
                            .unwrap_or_default();
                            chunk.tool_calls.push(
                                ToolCallDelta::new(tool_call_index)
                                    .with_id(format!("call_{}", tool_call_index))
                                    .with_name(&call.name)
                                    .with_arguments(args),
                            );
                            tool_call_index += 1;
                        }
                    }
                }

                if candidate.finish_reason.is_some() {
                    chunk.finish_reason =
                        Some(map_finish_reason(candidate.finish_reason.as_deref()));
                }
            }

            if let Some(usage) = &parsed.usage_metadata {
                chunk.usage = Some(usage.to_usage());
            }

            if sender.send(chunk).await.is_err() {
                return Ok(()); // receiver dropped
            }
        }
    }

    Ok(())
}

fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<Value>) {
    let mut system_instruction = None;
    let mut contents = Vec::new();

    for m in messages {
        match m.role {
            Role::System => {
                system_instruction = Some(m.content.clone());
            }
            Role::User => {
                contents.push(json!({
                    "role": "user",
                    "parts": [{ "text": m.content }],
                }));
            }
            Role::Assistant => {
                let mut parts = Vec::new();
                if !m.content.is_empty() {
                    parts.push(json!({ "text": m.content }));
                }
                if let Some(tool_calls) = &m.tool_calls {
                    for call in tool_calls {
                        parts.push(json!({
                            "functionCall": {
                                "name": call.name,
                                "args": call.arguments,
                            }
                        }));
                    }
                }
                if !parts.is_empty() {
                    contents.push(json!({ "role": "model", "parts": parts }));
                }
            }
            Role::Tool => {
                let name = m.name.clone().unwrap_or_else(|| "tool".to_string());
                let response: Value = serde_json::from_str(&m.content)
                    .unwrap_or_else(|_| json!({ "result": m.content }));
                contents.push(json!({
                    "role": "user",
                    "parts": [{
                        "functionResponse": { "name": name, "response": response }
                    }],
                }));
            }
        }
    }

    (system_instruction, contents)
}

fn map_finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("MAX_TOKENS") => FinishReason::Length,
        Some("SAFETY") | Some("RECITATION") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

// Wire types

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<CandidatePart>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CandidatePart {
    text: Option<String>,
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    args: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
    total_token_count: Option<u32>,
}

impl UsageMetadata {
    fn to_usage(&self) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_token_count.unwrap_or(0),
            completion_tokens: self.candidates_token_count.unwrap_or(0),
            total_tokens: self.total_token_count.unwrap_or(0),
        }
    }
}
