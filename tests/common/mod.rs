//! Shared test fixtures: a scripted LLM provider and registry builders

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use aviary::agents::domain::{Message, ToolCall};
use aviary::agents::llm::{
    CompletionRequest, CompletionResponse, FinishReason, LlmProvider, LlmStream, ProviderFactory,
    StreamChunk, ToolCallDelta,
};
use aviary::agents::registry::AgentRegistry;
use aviary::config::Settings;
use aviary::agents::error::{LlmError, LlmResult};

/// Provider that replays a fixed sequence of responses and records every
/// request it receives.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<CompletionResponse>>,
    requests: Mutex<Vec<CompletionRequest>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<CompletionResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        })
    }

    /// Responses are delivered only after `delay`, for cancellation tests.
    pub fn with_delay(responses: Vec<CompletionResponse>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            delay: Some(delay),
        })
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_response(&self) -> CompletionResponse {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| text_response(""))
    }
}

pub fn text_response(text: &str) -> CompletionResponse {
    CompletionResponse {
        message: Message::assistant(text),
        finish_reason: FinishReason::Stop,
        usage: None,
    }
}

pub fn tool_call_response(name: &str, args: Value) -> CompletionResponse {
    CompletionResponse {
        message: Message::assistant_with_tools(
            "",
            vec![ToolCall::new(format!("call_{}", name), name, args)],
        ),
        finish_reason: FinishReason::ToolCalls,
        usage: None,
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-1"
    }

    async fn complete(&self, request: CompletionRequest) -> LlmResult<CompletionResponse> {
        self.requests.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.next_response())
    }

    fn complete_stream(&self, request: CompletionRequest) -> LlmStream {
        self.requests.lock().unwrap().push(request);
        let response = self.next_response();
        let delay = self.delay;

        let (sender, stream) = LlmStream::channel(16);
        tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            if !response.message.content.is_empty() {
                let mut chunk = StreamChunk::default();
                chunk.content = response.message.content.clone();
                if sender.send(chunk).await.is_err() {
                    return;
                }
            }

            if let Some(tool_calls) = &response.message.tool_calls {
                for (index, call) in tool_calls.iter().enumerate() {
                    let mut chunk = StreamChunk::default();
                    chunk.tool_calls.push(
                        ToolCallDelta::new(index)
                            .with_id(&call.id)
                            .with_name(&call.name)
                            .with_arguments(call.arguments.to_string()),
                    );
                    if sender.send(chunk).await.is_err() {
                        return;
                    }
                }
            }

            let mut finish = StreamChunk::default();
            finish.finish_reason = Some(response.finish_reason);
            finish.usage = response.usage;
            let _ = sender.send(finish).await;
        });

        stream
    }
}

/// Factory handing out scripted providers keyed by agent id.
pub fn scripted_factory(providers: HashMap<String, Arc<ScriptedProvider>>) -> ProviderFactory {
    Arc::new(move |config, _settings| {
        providers
            .get(&config.id)
            .cloned()
            .map(|p| p as Arc<dyn LlmProvider>)
            .ok_or_else(|| {
                LlmError::InvalidRequest(format!("no scripted provider for agent '{}'", config.id))
            })
    })
}

/// Write one agent config file into the directory.
pub fn write_agent(dir: &Path, file_name: &str, config: Value) -> anyhow::Result<()> {
    std::fs::write(dir.join(file_name), serde_json::to_string_pretty(&config)?)?;
    Ok(())
}

/// Registry over a temp directory of configs, with scripted providers.
pub async fn scripted_registry(
    dir: &Path,
    providers: HashMap<String, Arc<ScriptedProvider>>,
) -> anyhow::Result<Arc<AgentRegistry>> {
    let registry = AgentRegistry::with_provider_factory(
        Arc::new(Settings::default()),
        scripted_factory(providers),
    );
    registry.load_all(dir).await?;
    Ok(registry)
}
