//! Registry loading, lookup and shutdown behavior

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use aviary::agents::error::AgentError;
use aviary::agents::registry::AgentRegistry;
use aviary::config::Settings;

use common::write_agent;

fn registry() -> Arc<AgentRegistry> {
    AgentRegistry::new(Arc::new(Settings::default()))
}

fn sales_config() -> serde_json::Value {
    json!({
        "id": "sales-1",
        "path": "sales",
        "name": "Sales",
        "description": "Answers pricing questions",
        "systemPrompt": "You are the sales assistant."
    })
}

fn support_config() -> serde_json::Value {
    json!({
        "id": "support-1",
        "path": "support",
        "name": "Support",
        "systemPrompt": "You are the support assistant."
    })
}

#[tokio::test]
async fn loads_configs_and_projects_metadata() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    write_agent(dir.path(), "sales.json", sales_config())?;
    write_agent(dir.path(), "support.json", support_config())?;
    write_agent(dir.path(), "notes.txt", json!({ "ignored": true }))?;

    let registry = registry();
    let count = registry.load_all(dir.path()).await?;
    assert_eq!(count, 2);

    let listed = registry.list().await;
    let paths: Vec<_> = listed.iter().map(|a| a.path.as_str()).collect();
    assert_eq!(paths, ["sales", "support"]);
    assert_eq!(listed[0].id, "sales-1");
    assert_eq!(listed[0].description, "Answers pricing questions");

    assert!(registry.has("sales").await);
    assert!(!registry.has("billing").await);

    let config = registry.get_config("sales").await?;
    assert_eq!(config.id, "sales-1");
    assert_eq!(config.system_prompt, "You are the sales assistant.");
    assert!(config.model.is_none());

    Ok(())
}

#[tokio::test]
async fn agents_are_created_lazily() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    write_agent(dir.path(), "sales.json", sales_config())?;

    let registry = registry();
    registry.load_all(dir.path()).await?;

    let agent = registry.get("sales").await?;
    assert!(!agent.is_initialized().await);
    Ok(())
}

#[tokio::test]
async fn missing_directory_yields_empty_registry() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let missing = dir.path().join("does-not-exist");

    let registry = registry();
    let count = registry.load_all(&missing).await?;
    assert_eq!(count, 0);
    assert!(registry.list().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn unknown_path_is_agent_not_found() -> anyhow::Result<()> {
    let registry = registry();
    registry.load_all(TempDir::new()?.path()).await?;

    match registry.get("ghost").await {
        Err(AgentError::NotFound(path)) => assert_eq!(path, "ghost"),
        other => panic!("expected NotFound, got {:?}", other.map(|_| ())),
    }
    Ok(())
}

#[tokio::test]
async fn duplicate_paths_are_fatal() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    write_agent(dir.path(), "a.json", sales_config())?;
    let mut duplicate = sales_config();
    duplicate["id"] = json!("sales-2");
    write_agent(dir.path(), "b.json", duplicate)?;

    let err = registry().load_all(dir.path()).await.unwrap_err();
    match err {
        AgentError::Config { reason, .. } => assert!(reason.contains("duplicate")),
        other => panic!("expected Config error, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn invalid_config_names_the_offending_file() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let mut bad = sales_config();
    bad["path"] = json!("Sales Agent");
    write_agent(dir.path(), "broken.json", bad)?;

    let err = registry().load_all(dir.path()).await.unwrap_err();
    match err {
        AgentError::Config { file, reason } => {
            assert!(file.ends_with("broken.json"));
            assert!(reason.contains("path"));
        }
        other => panic!("expected Config error, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn unparseable_json_names_the_offending_file() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    std::fs::write(dir.path().join("mangled.json"), "{ not json")?;

    let err = registry().load_all(dir.path()).await.unwrap_err();
    match err {
        AgentError::Config { file, .. } => assert!(file.ends_with("mangled.json")),
        other => panic!("expected Config error, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn shutdown_then_reload_restores_the_same_projection() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    write_agent(dir.path(), "sales.json", sales_config())?;
    write_agent(dir.path(), "support.json", support_config())?;

    let registry = registry();
    registry.load_all(dir.path()).await?;
    let before = registry.list().await;

    registry.shutdown_all().await;
    assert!(registry.list().await.is_empty());

    registry.load_all(dir.path()).await?;
    let after = registry.list().await;

    let project = |entries: &[aviary::agents::registry::AgentSummary]| {
        entries
            .iter()
            .map(|a| (a.path.clone(), a.id.clone(), a.name.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(project(&before), project(&after));
    Ok(())
}

#[tokio::test]
async fn scripted_factory_smoke() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    write_agent(dir.path(), "sales.json", sales_config())?;

    let providers = HashMap::from([(
        "sales-1".to_string(),
        common::ScriptedProvider::new(vec![common::text_response("hello")]),
    )]);
    let registry = common::scripted_registry(dir.path(), providers).await?;

    let agent = registry.get("sales").await?;
    let output = agent
        .execute(
            aviary::agents::domain::ChatInput::new("hi"),
            aviary::agents::domain::CancelToken::new(),
        )
        .await?;
    assert_eq!(output.text, "hello");
    assert!(output.tool_calls.is_empty());
    assert!(agent.is_initialized().await);
    Ok(())
}
