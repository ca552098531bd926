//! Runtime agent: config plus live collaborators
//!
//! An agent is created lazily by the registry and initialized on first use:
//! tool-source connections are opened and their tools translated, the
//! retrieval client is built, and delegation tools are synthesized. A turn
//! drives a bounded tool-calling loop against the configured provider.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Instant;

use futures::StreamExt;
use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::agents::config::AgentConfig;
use crate::agents::domain::{
    CancelToken, ChatChunk, ChatFinishReason, ChatInput, ChatOutput, ChatStream,
    ChatStreamSender, Message, Tool, ToolCall, ToolCallRecord,
};
use crate::agents::error::{AgentError, AgentResult};
use crate::agents::llm::{
    CompletionRequest, FinishReason, ProviderFactory, TokenUsage, ToolCallAccumulator,
};
use crate::agents::mcp::ToolSourceClient;
use crate::agents::registry::AgentRegistry;
use crate::agents::retrieval::RetrievalClient;
use crate::agents::tools::{
    delegation_tool, effective_tools, translate_tool, DynamicToolRule, PageContextRule,
    PAGE_CONTENT_TOOL, PAGE_CONTEXT_INSTRUCTION,
};
use crate::config::Settings;

/// Default cap on model invocations per turn, a deliberate cost/latency
/// bound. Hitting it reports the `steps` finish reason.
pub const MAX_TOOL_STEPS: usize = 5;

/// A configured agent bound to its live collaborators
pub struct RuntimeAgent {
    config: AgentConfig,
    settings: Arc<Settings>,
    registry: Weak<AgentRegistry>,
    provider_factory: ProviderFactory,
    state: RwLock<Option<Arc<AgentState>>>,
    init_lock: Mutex<()>,
}

/// Collaborators built at initialization time
struct AgentState {
    provider: Arc<dyn crate::agents::llm::LlmProvider>,
    sources: Vec<Arc<ToolSourceClient>>,
    static_tools: HashMap<String, Tool>,
    retrieval: Option<Arc<RetrievalClient>>,
    rules: Vec<Arc<dyn DynamicToolRule>>,
}

impl RuntimeAgent {
    pub(crate) fn new(
        config: AgentConfig,
        settings: Arc<Settings>,
        registry: Weak<AgentRegistry>,
        provider_factory: ProviderFactory,
    ) -> Self {
        Self {
            config,
            settings,
            registry,
            provider_factory,
            state: RwLock::new(None),
            init_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn path(&self) -> &str {
        &self.config.path
    }

    pub async fn is_initialized(&self) -> bool {
        self.state.read().await.is_some()
    }

    /// Initialize the agent's collaborators. Idempotent; called implicitly on
    /// first use.
    pub async fn initialize(&self) -> AgentResult<()> {
        self.ensure_initialized().await.map(|_| ())
    }

    async fn ensure_initialized(&self) -> AgentResult<Arc<AgentState>> {
        if let Some(state) = self.state.read().await.as_ref() {
            return Ok(state.clone());
        }

        let _guard = self.init_lock.lock().await;
        if let Some(state) = self.state.read().await.as_ref() {
            return Ok(state.clone());
        }

        let built = Arc::new(self.build_state().await?);
        *self.state.write().await = Some(built.clone());
        Ok(built)
    }

    async fn build_state(&self) -> AgentResult<AgentState> {
        let provider = (self.provider_factory)(&self.config, &self.settings.llm)
            .map_err(|e| AgentError::execution(&self.config.id, e))?;

        let mut sources = Vec::new();
        let mut static_tools = HashMap::new();

        if self.config.enable_tools {
            for source_config in &self.config.tool_sources {
                let client = match ToolSourceClient::connect(source_config).await {
                    Ok(client) => Arc::new(client),
                    Err(e) => {
                        warn!(
                            agent = %self.config.id,
                            source = %source_config.id,
                            "tool source unreachable, continuing without it: {}", e
                        );
                        continue;
                    }
                };

                match client.list_tools().await {
                    Ok(descriptors) => {
                        for descriptor in descriptors {
                            let tool = translate_tool(&source_config.id, &descriptor, client.clone());
                            static_tools.insert(tool.name().to_string(), tool);
                        }
                    }
                    Err(e) => {
                        warn!(
                            agent = %self.config.id,
                            source = %source_config.id,
                            "failed to list tools: {}", e
                        );
                    }
                }
                sources.push(client);
            }

            // Target existence is checked at invocation time, not here.
            if let Some(delegation) = &self.config.delegation {
                if delegation.enabled {
                    for target in &delegation.targets {
                        let tool = delegation_tool(self.registry.clone(), target);
                        static_tools.insert(tool.name().to_string(), tool);
                    }
                }
            }
        }

        let retrieval = match &self.config.retrieval {
            Some(config) if config.enabled => {
                match RetrievalClient::build(config, &self.settings.retrieval) {
                    Ok(client) => Some(Arc::new(client)),
                    Err(e) => {
                        warn!(agent = %self.config.id, "retrieval client unavailable: {}", e);
                        None
                    }
                }
            }
            _ => None,
        };

        info!(
            agent = %self.config.id,
            tools = static_tools.len(),
            "agent initialized"
        );

        Ok(AgentState {
            provider,
            sources,
            static_tools,
            retrieval,
            rules: vec![Arc::new(PageContextRule)],
        })
    }

    /// System prompt for one turn: the configured base prompt, an optional
    /// retrieval block, and the page-context instruction when that tool was
    /// injected. Retrieval faults fall back silently to the base prompt.
    async fn assemble_system_prompt(
        &self,
        state: &AgentState,
        input: &ChatInput,
        page_tool_active: bool,
    ) -> String {
        let mut prompt = self.config.system_prompt.clone();

        if let Some(retrieval) = &state.retrieval {
            match retrieval.retrieve(&input.message).await {
                Ok(documents) if !documents.is_empty() => {
                    prompt.push_str("\n\n");
                    prompt.push_str(&retrieval.format_context(&documents));
                }
                Ok(_) => {
                    debug!(agent = %self.config.id, "retrieval returned no documents");
                }
                Err(e) => {
                    warn!(
                        agent = %self.config.id,
                        "retrieval failed, using base prompt: {}", e
                    );
                }
            }
        }

        if page_tool_active {
            prompt.push_str("\n\n");
            prompt.push_str(PAGE_CONTEXT_INSTRUCTION);
        }

        prompt
    }

    /// Execute a turn, buffering the result.
    pub async fn execute(&self, input: ChatInput, cancel: CancelToken) -> AgentResult<ChatOutput> {
        let state = self.ensure_initialized().await?;
        let tools = effective_tools(&state.static_tools, &state.rules, &input);
        let system_prompt = self
            .assemble_system_prompt(&state, &input, tools.contains_key(PAGE_CONTENT_TOOL))
            .await;
        let definitions: Vec<_> = tools.values().map(|t| t.definition.clone()).collect();

        let mut messages = vec![
            Message::system(system_prompt),
            Message::user(input.message.clone()),
        ];
        let mut records: Vec<ToolCallRecord> = Vec::new();
        let mut usage: Option<TokenUsage> = None;
        let mut last_content = String::new();

        for _step in 0..self.settings.llm.max_tool_steps {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            let request = CompletionRequest {
                messages: messages.clone(),
                tools: definitions.clone(),
            };
            let response = state
                .provider
                .complete(request)
                .await
                .map_err(|e| AgentError::execution(&self.config.id, e))?;
            usage = TokenUsage::accumulate(usage, response.usage);

            let tool_calls = response.message.tool_calls.clone().unwrap_or_default();
            if tool_calls.is_empty() {
                return Ok(ChatOutput {
                    text: response.message.content,
                    tool_calls: records,
                    usage,
                    finish_reason: chat_finish_reason(response.finish_reason),
                });
            }

            last_content = response.message.content.clone();
            messages.push(response.message);

            for call in &tool_calls {
                if cancel.is_cancelled() {
                    return Err(AgentError::Cancelled);
                }
                let record = invoke_tool(&tools, call).await;
                messages.push(Message::tool_result(&call.id, &call.name, &record.result));
                records.push(record);
            }
        }

        Ok(ChatOutput {
            text: last_content,
            tool_calls: records,
            usage,
            finish_reason: ChatFinishReason::Steps,
        })
    }

    /// Execute a turn, streaming chunks as they are produced.
    pub fn execute_stream(self: &Arc<Self>, input: ChatInput, cancel: CancelToken) -> ChatStream {
        let (sender, stream) = ChatStream::channel(64);
        let agent = Arc::clone(self);

        tokio::spawn(async move {
            agent.stream_turn(input, cancel, sender).await;
        });

        stream
    }

    async fn stream_turn(&self, input: ChatInput, cancel: CancelToken, sender: ChatStreamSender) {
        let state = match self.ensure_initialized().await {
            Ok(state) => state,
            Err(e) => {
                let _ = sender.send(ChatChunk::error(e.to_string())).await;
                return;
            }
        };

        let tools = effective_tools(&state.static_tools, &state.rules, &input);
        let system_prompt = self
            .assemble_system_prompt(&state, &input, tools.contains_key(PAGE_CONTENT_TOOL))
            .await;
        let definitions: Vec<_> = tools.values().map(|t| t.definition.clone()).collect();

        let mut messages = vec![
            Message::system(system_prompt),
            Message::user(input.message.clone()),
        ];
        let mut usage: Option<TokenUsage> = None;

        for _step in 0..self.settings.llm.max_tool_steps {
            if cancel.is_cancelled() {
                let _ = sender.send(ChatChunk::error("execution cancelled")).await;
                return;
            }

            let mut llm_stream = state.provider.complete_stream(CompletionRequest {
                messages: messages.clone(),
                tools: definitions.clone(),
            });

            let mut content = String::new();
            let mut accumulator = ToolCallAccumulator::new();
            let mut finish: Option<FinishReason> = None;

            while let Some(item) = llm_stream.next().await {
                if cancel.is_cancelled() {
                    let _ = sender.send(ChatChunk::error("execution cancelled")).await;
                    return;
                }

                let chunk = match item {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = sender.send(ChatChunk::error(e.to_string())).await;
                        return;
                    }
                };

                if !chunk.content.is_empty() {
                    content.push_str(&chunk.content);
                    if sender.send(ChatChunk::text(&chunk.content)).await.is_err() {
                        return;
                    }
                }
                for delta in &chunk.tool_calls {
                    accumulator.apply_delta(delta);
                }
                if let Some(reason) = chunk.finish_reason {
                    finish = Some(reason);
                }
                usage = TokenUsage::accumulate(usage, chunk.usage);
            }

            let tool_calls = accumulator.build();
            if tool_calls.is_empty() {
                // Terminal step: the only place a finish chunk is emitted.
                let reason = chat_finish_reason(finish.unwrap_or(FinishReason::Stop));
                let _ = sender.send(ChatChunk::finish(reason, usage)).await;
                return;
            }

            messages.push(Message::assistant_with_tools(content, tool_calls.clone()));

            for call in &tool_calls {
                if sender.send(ChatChunk::tool_call(call)).await.is_err() {
                    return;
                }
                let record = invoke_tool(&tools, call).await;
                if sender
                    .send(ChatChunk::tool_result(&call.id, record.result.clone()))
                    .await
                    .is_err()
                {
                    return;
                }
                messages.push(Message::tool_result(&call.id, &call.name, &record.result));
            }
        }

        let _ = sender
            .send(ChatChunk::finish(ChatFinishReason::Steps, usage))
            .await;
    }

    /// Close tool-source connections, drop the retrieval client and mark the
    /// agent uninitialized.
    pub async fn shutdown(&self) -> AgentResult<()> {
        let state = self.state.write().await.take();
        if let Some(state) = state {
            for source in &state.sources {
                source.close().await;
            }
            debug!(agent = %self.config.id, "agent shut down");
        }
        Ok(())
    }
}

async fn invoke_tool(tools: &HashMap<String, Tool>, call: &ToolCall) -> ToolCallRecord {
    let started = Instant::now();
    let outcome = match tools.get(&call.name) {
        Some(tool) => tool.executor.execute(call.arguments.clone()).await,
        None => Err(AgentError::ToolExecution(format!(
            "unknown tool '{}'",
            call.name
        ))),
    };
    let duration_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(result) => ToolCallRecord {
            id: call.id.clone(),
            tool_name: call.name.clone(),
            args: call.arguments.clone(),
            result,
            success: true,
            error: None,
            duration_ms,
        },
        Err(e) => ToolCallRecord {
            id: call.id.clone(),
            tool_name: call.name.clone(),
            args: call.arguments.clone(),
            result: json!({ "error": e.to_string() }),
            success: false,
            error: Some(e.to_string()),
            duration_ms,
        },
    }
}

fn chat_finish_reason(reason: FinishReason) -> ChatFinishReason {
    match reason {
        FinishReason::Length => ChatFinishReason::Length,
        FinishReason::ContentFilter => ChatFinishReason::ContentFilter,
        FinishReason::Stop | FinishReason::ToolCalls => ChatFinishReason::Stop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::tools::page_content_tool;

    #[tokio::test]
    async fn unknown_tool_produces_a_failure_record() {
        let tools = HashMap::new();
        let call = ToolCall::new("call_1", "nonexistent", json!({}));

        let record = invoke_tool(&tools, &call).await;
        assert!(!record.success);
        assert_eq!(record.tool_name, "nonexistent");
        assert!(record.error.as_deref().unwrap().contains("unknown tool"));
        assert!(record.result["error"].is_string());
    }

    #[tokio::test]
    async fn successful_invocation_records_the_result() {
        let tool = page_content_tool("# Title\nbody".to_string());
        let tools = HashMap::from([(tool.name().to_string(), tool)]);
        let call = ToolCall::new(
            "call_1",
            PAGE_CONTENT_TOOL,
            json!({ "section": "headings" }),
        );

        let record = invoke_tool(&tools, &call).await;
        assert!(record.success);
        assert_eq!(record.result, json!("# Title"));
        assert!(record.error.is_none());
    }

    #[test]
    fn intermediate_reasons_never_leak_into_chat_output() {
        assert_eq!(
            chat_finish_reason(FinishReason::ToolCalls),
            ChatFinishReason::Stop
        );
        assert_eq!(
            chat_finish_reason(FinishReason::Length),
            ChatFinishReason::Length
        );
    }
}
