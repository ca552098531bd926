use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use aviary::adapters::AppState;
use aviary::agents::a2a::{TaskExecutor, DEFAULT_TASK_RETENTION_MS};
use aviary::agents::registry::AgentRegistry;
use aviary::cli::Cli;
use aviary::config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(&cli)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = Arc::new(settings);
    info!(
        host = %settings.server.host,
        port = settings.server.port,
        "starting aviary"
    );

    let registry = AgentRegistry::new(settings.clone());
    if let Err(e) = registry.load_all(&settings.agents_dir).await {
        error!("failed to load agent configs: {}", e);
        return Err(e.into());
    }

    let executor = TaskExecutor::new(registry.clone());

    // Hourly retention pass over terminal tasks.
    let gc_executor = executor.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60 * 60));
        ticker.tick().await; // first tick fires immediately
        loop {
            ticker.tick().await;
            gc_executor.cleanup_old_tasks(DEFAULT_TASK_RETENTION_MS).await;
        }
    });

    let state = AppState::new(registry.clone(), executor, settings.clone());
    let app = aviary::create_app(state);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    registry.shutdown_all().await;
    info!("aviary stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {}", e);
    }
}
