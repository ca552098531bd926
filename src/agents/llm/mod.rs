//! LLM provider implementations with streaming support
//!
//! Two providers are supported: the native generative-language API and any
//! OpenAI-compatible chat-completions endpoint. Both are driven through the
//! [`LlmProvider`] trait so the runtime never dispatches on the concrete type.

mod native;
mod openai;
mod stream;

pub use native::NativeProvider;
pub use openai::OpenAiCompatProvider;
pub use stream::*;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agents::config::{AgentConfig, ProviderKind};
use crate::agents::domain::{Message, ToolDefinition};
use crate::agents::error::{LlmError, LlmResult};
use crate::config::LlmSettings;

/// Trait for LLM providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name
    fn name(&self) -> &str;

    /// Model being used
    fn model(&self) -> &str;

    /// Complete a request (non-streaming)
    async fn complete(&self, request: CompletionRequest) -> LlmResult<CompletionResponse>;

    /// Complete a request with streaming
    fn complete_stream(&self, request: CompletionRequest) -> LlmStream;
}

/// Request for LLM completion. Sampling parameters are fixed per provider
/// instance at construction time.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// Messages in the conversation
    pub messages: Vec<Message>,
    /// Tools available for calling
    pub tools: Vec<ToolDefinition>,
}

/// Response from LLM completion
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Generated message
    pub message: Message,
    /// Reason the completion stopped
    pub finish_reason: FinishReason,
    /// Token usage
    pub usage: Option<TokenUsage>,
}

/// Reason completion stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stop
    Stop,
    /// Hit max tokens
    Length,
    /// Tool call requested
    ToolCalls,
    /// Content filtered
    ContentFilter,
}

/// Token usage information
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Fold another step's usage into an accumulated total.
    pub fn accumulate(acc: Option<TokenUsage>, step: Option<TokenUsage>) -> Option<TokenUsage> {
        match (acc, step) {
            (Some(a), Some(b)) => Some(TokenUsage {
                prompt_tokens: a.prompt_tokens + b.prompt_tokens,
                completion_tokens: a.completion_tokens + b.completion_tokens,
                total_tokens: a.total_tokens + b.total_tokens,
            }),
            (a, b) => a.or(b),
        }
    }
}

/// Factory used by the registry to build providers, overridable for embedding
/// and tests.
pub type ProviderFactory =
    Arc<dyn Fn(&AgentConfig, &LlmSettings) -> LlmResult<Arc<dyn LlmProvider>> + Send + Sync>;

/// The default factory dispatching on the config's provider tag.
pub fn default_provider_factory() -> ProviderFactory {
    Arc::new(|config, settings| create_provider(config, settings))
}

/// Create an LLM provider for an agent config, filling omitted model and
/// sampling parameters from the service-level defaults.
pub fn create_provider(
    config: &AgentConfig,
    settings: &LlmSettings,
) -> LlmResult<Arc<dyn LlmProvider>> {
    let model = config
        .model
        .clone()
        .unwrap_or_else(|| settings.default_model.clone());
    let temperature = config.temperature.unwrap_or(settings.default_temperature);
    let max_tokens = config.max_tokens.unwrap_or(settings.default_max_tokens);

    match config.provider {
        ProviderKind::Native => Ok(Arc::new(NativeProvider::new(
            model,
            temperature,
            max_tokens,
            &settings.native,
        )?)),
        ProviderKind::OpenAiCompatible => {
            let endpoint = config.provider_config.as_ref().ok_or_else(|| {
                LlmError::InvalidRequest(
                    "providerConfig is required for openai-compatible agents".to_string(),
                )
            })?;
            Ok(Arc::new(OpenAiCompatProvider::new(
                model,
                temperature,
                max_tokens,
                endpoint,
            )?))
        }
    }
}
