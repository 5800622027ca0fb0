use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use conductor_domain::config::{Config, ConfigSeverity};
use conductor_mcp_client::McpManager;
use conductor_providers::ProviderRegistry;
use conductor_sessions::CheckpointStore;

use conductor_gateway::cancel::CancelMap;
use conductor_gateway::cli::{Cli, Command, ConfigCommand};
use conductor_gateway::session_lock::SessionLockMap;
use conductor_gateway::state::AppState;
use conductor_gateway::{app, cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let parsed = Cli::parse();

    match parsed.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let (config, _path) = cli::load_config()?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, path) = cli::load_config()?;
            let ok = cli::validate(&config, &path);
            if !ok {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _path) = cli::load_config()?;
            cli::show(&config);
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,conductor_gateway=debug")),
        )
        .json()
        .init();
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("conductor gateway starting");

    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
);
    }

    let llm = Arc::new(ProviderRegistry::from_config(&config.llm).context("initializing LLM providers")?);
    if llm.is_empty() {
        tracing::warn!("no LLM providers initialized — every turn routed to an LLM role will fail");
    } else {
        tracing::info!(providers = llm.len(), "LLM provider registry ready");
    }

    let mcp = if config.mcp.servers.is_empty() {
        tracing::info!("no tool services configured");
        Arc::new(McpManager::empty())
    } else {
        tracing::info!(count = config.mcp.servers.len(), "initializing tool services");
        Arc::new(McpManager::from_config(&config.mcp, config.limits.tool_call_timeout_ms).await)
    };
    tracing::info!(servers = mcp.server_count(), tools = mcp.tool_count(), "tool transport adapter ready");

    let checkpoints = Arc::new(CheckpointStore::new(config.sessions.clone()));
    let session_locks = Arc::new(SessionLockMap::new());
    let cancel_map = Arc::new(CancelMap::new());

    let state = AppState {
        config: config.clone(),
        checkpoints: checkpoints.clone(),
        mcp,
        llm,
        session_locks: session_locks.clone(),
        cancel_map,
    };

    // Periodic idle-checkpoint eviction and session-lock pruning: sessions
    // are discarded on connection close, extended here to a background
    // sweep for connections that simply went quiet.
    {
        let checkpoints = checkpoints.clone();
        let session_locks = session_locks.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                let evicted = checkpoints.evict_idle(chrono::Utc::now());
                if evicted > 0 {
                    tracing::info!(evicted, "evicted idle session checkpoints");
                }
                session_locks.prune_idle();
            }
        });
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, ws_path = %config.server.ws_path, "conductor gateway listening");

    let router = app::build_router(state);
    axum::serve(listener, router).await.context("axum server error")?;

    Ok(())
}
