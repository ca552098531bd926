//! Delegation tools: dispatch a message to another registered agent
//!
//! The synthesized tool holds a weak registry handle; the registry owns the
//! agents and is shut down last, so the tool never keeps an agent alive.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::agents::config::DelegationTarget;
use crate::agents::domain::{CancelToken, ChatInput, Tool, ToolDefinition, ToolExecutor};
use crate::agents::error::AgentResult;
use crate::agents::registry::AgentRegistry;

/// Build the tool for one delegation target.
pub fn delegation_tool(registry: Weak<AgentRegistry>, target: &DelegationTarget) -> Tool {
    let definition = ToolDefinition::new(
        target.tool_name.clone(),
        target.description.clone(),
        json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "Message to send to the agent"
                }
            },
            "required": ["message"]
        }),
    );

    let executor = Arc::new(DelegationExecutor {
        registry,
        agent_path: target.agent_path.clone(),
    });

    Tool::new(definition, executor)
}

struct DelegationExecutor {
    registry: Weak<AgentRegistry>,
    agent_path: String,
}

impl DelegationExecutor {
    async fn dispatch(&self, message: String) -> Result<String, String> {
        let registry = self
            .registry
            .upgrade()
            .ok_or_else(|| "registry is shut down".to_string())?;
        let agent = registry
            .get(&self.agent_path)
            .await
            .map_err(|e| e.to_string())?;

        let output = agent
            .execute(ChatInput::new(message), CancelToken::new())
            .await
            .map_err(|e| e.to_string())?;

        Ok(output.text)
    }
}

#[async_trait]
impl ToolExecutor for DelegationExecutor {
    /// Failures come back as a string result so the calling model can
    /// recover instead of aborting the turn.
    async fn execute(&self, args: Value) -> AgentResult<Value> {
        let message = args
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match self.dispatch(message).await {
            Ok(text) => Ok(Value::String(text)),
            Err(reason) => Ok(Value::String(format!(
                "Error: Failed to get response from {} agent. {}",
                self.agent_path, reason
            ))),
        }
    }
}
