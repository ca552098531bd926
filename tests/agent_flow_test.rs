//! End-to-end agent turns with scripted providers: delegation, dynamic
//! tools, retrieval fallback, the step cap and stream invariants.

mod common;

use std::collections::HashMap;

use futures::StreamExt;
use serde_json::json;
use tempfile::TempDir;

use aviary::agents::domain::{
    CancelToken, ChatChunk, ChatFinishReason, ChatInput, Role,
};
use aviary::agents::runtime::MAX_TOOL_STEPS;

use common::{scripted_registry, text_response, tool_call_response, write_agent, ScriptedProvider};

fn orchestrator_config() -> serde_json::Value {
    json!({
        "id": "orchestrator-1",
        "path": "orchestrator",
        "name": "Orchestrator",
        "systemPrompt": "Route questions to the right specialist.",
        "delegation": {
            "targets": [
                {
                    "agentPath": "sales",
                    "toolName": "askSales",
                    "description": "Ask the sales agent about pricing"
                }
            ]
        }
    })
}

fn sales_config() -> serde_json::Value {
    json!({
        "id": "sales-1",
        "path": "sales",
        "name": "Sales",
        "systemPrompt": "You are the sales assistant."
    })
}

#[tokio::test]
async fn delegation_routes_through_the_target_agent() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    write_agent(dir.path(), "orchestrator.json", orchestrator_config())?;
    write_agent(dir.path(), "sales.json", sales_config())?;

    let orchestrator = ScriptedProvider::new(vec![
        tool_call_response("askSales", json!({ "message": "What are your prices?" })),
        text_response("Sales says: plans start at $10."),
    ]);
    let sales = ScriptedProvider::new(vec![text_response("Plans start at $10 per seat.")]);

    let providers = HashMap::from([
        ("orchestrator-1".to_string(), orchestrator.clone()),
        ("sales-1".to_string(), sales.clone()),
    ]);
    let registry = scripted_registry(dir.path(), providers).await?;

    let agent = registry.get("orchestrator").await?;
    let output = agent
        .execute(ChatInput::new("What are your prices?"), CancelToken::new())
        .await?;

    assert_eq!(output.text, "Sales says: plans start at $10.");
    assert_eq!(output.finish_reason, ChatFinishReason::Stop);
    assert_eq!(output.tool_calls.len(), 1);

    let record = &output.tool_calls[0];
    assert_eq!(record.tool_name, "askSales");
    assert!(record.args.to_string().to_lowercase().contains("price"));
    assert!(record.success);
    assert_eq!(record.result, json!("Plans start at $10 per seat."));

    // The sales agent saw the delegated message, under its own system prompt.
    let sales_requests = sales.requests();
    assert_eq!(sales_requests.len(), 1);
    assert_eq!(
        sales_requests[0].messages[0].content,
        "You are the sales assistant."
    );
    assert_eq!(sales_requests[0].messages[1].content, "What are your prices?");
    Ok(())
}

#[tokio::test]
async fn delegation_to_a_missing_agent_returns_an_error_string() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let mut config = orchestrator_config();
    config["delegation"]["targets"][0]["agentPath"] = json!("billing");
    write_agent(dir.path(), "orchestrator.json", config)?;

    let orchestrator = ScriptedProvider::new(vec![
        tool_call_response("askSales", json!({ "message": "hello" })),
        text_response("done"),
    ]);
    let providers = HashMap::from([("orchestrator-1".to_string(), orchestrator)]);
    let registry = scripted_registry(dir.path(), providers).await?;

    let output = registry
        .get("orchestrator")
        .await?
        .execute(ChatInput::new("hi"), CancelToken::new())
        .await?;

    let record = &output.tool_calls[0];
    // Delegation failures come back as a result string so the model recovers.
    assert!(record.success);
    let text = record.result.as_str().unwrap();
    assert!(text.starts_with("Error: Failed to get response from billing agent."));
    Ok(())
}

#[tokio::test]
async fn plain_agents_never_grow_delegation_tools() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    write_agent(dir.path(), "sales.json", sales_config())?;

    let sales = ScriptedProvider::new(vec![text_response("Hello!")]);
    let providers = HashMap::from([("sales-1".to_string(), sales.clone())]);
    let registry = scripted_registry(dir.path(), providers).await?;

    let output = registry
        .get("sales")
        .await?
        .execute(ChatInput::new("Hello!"), CancelToken::new())
        .await?;

    assert!(output
        .tool_calls
        .iter()
        .all(|call| !call.tool_name.starts_with("ask")));

    // The model was not offered any tools either.
    assert!(sales.requests()[0].tools.is_empty());
    Ok(())
}

#[tokio::test]
async fn failed_retrieval_falls_back_to_the_exact_base_prompt() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let mut config = sales_config();
    config["retrieval"] = json!({
        "provider": "chroma",
        "index": "docs",
        "minScore": 0.9
    });
    write_agent(dir.path(), "sales.json", config)?;

    let sales = ScriptedProvider::new(vec![text_response("answer")]);
    let providers = HashMap::from([("sales-1".to_string(), sales.clone())]);

    // Point retrieval at a closed port so the embedding call fails fast.
    let mut settings = aviary::config::Settings::default();
    settings.retrieval.embedding.api_key = Some("test-key".to_string());
    settings.retrieval.embedding.base_url = "http://127.0.0.1:1".to_string();
    settings.retrieval.chroma.base_url = "http://127.0.0.1:1".to_string();

    let registry = aviary::agents::registry::AgentRegistry::with_provider_factory(
        std::sync::Arc::new(settings),
        common::scripted_factory(providers),
    );
    registry.load_all(dir.path()).await?;

    registry
        .get("sales")
        .await?
        .execute(ChatInput::new("What do the docs say?"), CancelToken::new())
        .await?;

    let request = &sales.requests()[0];
    assert_eq!(request.messages[0].role, Role::System);
    assert_eq!(request.messages[0].content, "You are the sales assistant.");
    Ok(())
}

#[tokio::test]
async fn page_context_injects_tool_and_instruction() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    write_agent(dir.path(), "sales.json", sales_config())?;

    let sales = ScriptedProvider::new(vec![
        tool_call_response("getPageContent", json!({ "section": "tables" })),
        text_response("The basic plan costs 9."),
    ]);
    let providers = HashMap::from([("sales-1".to_string(), sales.clone())]);
    let registry = scripted_registry(dir.path(), providers).await?;

    let mut input = ChatInput::new("What does the table on screen say?");
    input.metadata.insert(
        "pageContext".to_string(),
        json!("# Pricing\n\n--- Data Tables ---\nplan | price\nbasic | 9\n\n--- Form Fields ---\nemail"),
    );

    let output = registry
        .get("sales")
        .await?
        .execute(input, CancelToken::new())
        .await?;

    let record = &output.tool_calls[0];
    assert_eq!(record.tool_name, "getPageContent");
    assert!(record.success);
    assert!(record.result.as_str().unwrap().contains("basic | 9"));
    assert!(!record.result.as_str().unwrap().contains("email"));

    let first_request = &sales.requests()[0];
    assert!(first_request.messages[0]
        .content
        .starts_with("You are the sales assistant."));
    assert!(first_request.messages[0].content.contains("getPageContent"));
    assert!(first_request
        .tools
        .iter()
        .any(|t| t.name == "getPageContent"));

    // Without page context neither the tool nor the instruction appears.
    let plain = ScriptedProvider::new(vec![text_response("hi")]);
    let providers = HashMap::from([("sales-1".to_string(), plain.clone())]);
    let registry = scripted_registry(dir.path(), providers).await?;
    registry
        .get("sales")
        .await?
        .execute(ChatInput::new("hello"), CancelToken::new())
        .await?;
    assert_eq!(
        plain.requests()[0].messages[0].content,
        "You are the sales assistant."
    );
    assert!(plain.requests()[0].tools.is_empty());
    Ok(())
}

#[tokio::test]
async fn step_cap_reports_steps_finish_reason() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    write_agent(dir.path(), "sales.json", sales_config())?;

    // The model asks for the page on every step and never stops on its own.
    let responses = (0..MAX_TOOL_STEPS + 2)
        .map(|_| tool_call_response("getPageContent", json!({ "section": "headings" })))
        .collect();
    let sales = ScriptedProvider::new(responses);
    let providers = HashMap::from([("sales-1".to_string(), sales.clone())]);
    let registry = scripted_registry(dir.path(), providers).await?;

    let mut input = ChatInput::new("keep reading");
    input
        .metadata
        .insert("pageContext".to_string(), json!("# Title\nbody"));

    let output = registry
        .get("sales")
        .await?
        .execute(input, CancelToken::new())
        .await?;

    assert_eq!(output.finish_reason, ChatFinishReason::Steps);
    assert_eq!(output.tool_calls.len(), MAX_TOOL_STEPS);
    assert_eq!(sales.requests().len(), MAX_TOOL_STEPS);
    Ok(())
}

#[tokio::test]
async fn stream_chunks_observe_the_protocol_invariants() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    write_agent(dir.path(), "orchestrator.json", orchestrator_config())?;
    write_agent(dir.path(), "sales.json", sales_config())?;

    let orchestrator = ScriptedProvider::new(vec![
        tool_call_response("askSales", json!({ "message": "prices?" })),
        text_response("All done."),
    ]);
    let sales = ScriptedProvider::new(vec![text_response("Ten dollars.")]);
    let providers = HashMap::from([
        ("orchestrator-1".to_string(), orchestrator),
        ("sales-1".to_string(), sales),
    ]);
    let registry = scripted_registry(dir.path(), providers).await?;

    let agent = registry.get("orchestrator").await?;
    let mut stream = agent.execute_stream(ChatInput::new("prices?"), CancelToken::new());

    let mut chunks = Vec::new();
    while let Some(chunk) = stream.next().await {
        chunks.push(chunk);
    }

    // Exactly one finish chunk, and it is last with a non-tool-calls reason.
    let finish_positions: Vec<_> = chunks
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c, ChatChunk::Finish { .. }))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(finish_positions, vec![chunks.len() - 1]);
    match chunks.last().unwrap() {
        ChatChunk::Finish { finish_reason, .. } => {
            assert_eq!(*finish_reason, ChatFinishReason::Stop)
        }
        other => panic!("expected finish, got {:?}", other),
    }

    // Every tool-call is answered later by a tool-result with the same id.
    for (i, chunk) in chunks.iter().enumerate() {
        if let ChatChunk::ToolCall { id, name, .. } = chunk {
            assert_eq!(name, "askSales");
            let answered = chunks[i + 1..].iter().any(
                |c| matches!(c, ChatChunk::ToolResult { id: rid, .. } if rid == id),
            );
            assert!(answered, "tool call {} never answered", id);
        }
    }

    // No error chunks in a healthy stream.
    assert!(chunks
        .iter()
        .all(|c| !matches!(c, ChatChunk::Error { .. })));

    // The streamed text equals the final answer.
    let text: String = chunks
        .iter()
        .filter_map(|c| match c {
            ChatChunk::Text { content } => Some(content.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(text, "All done.");
    Ok(())
}

#[tokio::test]
async fn provider_failure_surfaces_as_execution_error() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    write_agent(dir.path(), "sales.json", sales_config())?;

    // Empty provider map: initialization fails when the factory is consulted.
    let registry = scripted_registry(dir.path(), HashMap::new()).await?;

    let err = registry
        .get("sales")
        .await?
        .execute(ChatInput::new("hi"), CancelToken::new())
        .await
        .unwrap_err();

    assert_eq!(
        err.code(),
        aviary::agents::error::ErrorCode::AgentExecutionError
    );
    assert!(err.to_string().contains("sales-1"));
    Ok(())
}
