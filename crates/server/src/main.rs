use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use grounded_server::api::run_search;
use grounded_server::cli::{Cli, Command};
use grounded_server::{build_router, AppState};

fn load_config() -> grounded_core::Config {
    grounded_core::config::load_dotenv();
    grounded_core::Config::from_env()
}

async fn serve(config: grounded_core::Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let shutdown = CancellationToken::new();

    let state = Arc::new(AppState::connect(config, shutdown.clone()));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("API docs at http://{}/docs", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Wait for Ctrl-C, then cancel in-flight run waits.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
        return;
    }
    info!("Shutdown requested");
    shutdown.cancel();
}

async fn search_once(config: grounded_core::Config, query: &str) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let state = AppState::connect(config, shutdown.clone());

    let cancel_on_ctrl_c = tokio::spawn(shutdown_signal(shutdown));
    let response = run_search(&state, query).await;
    cancel_on_ctrl_c.abort();

    println!("{}", serde_json::to_string_pretty(&response)?);
    if response.is_error() {
        anyhow::bail!("search did not complete");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let mut config = load_config();
    config.log_summary();

    match cli.command() {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config).await
        }
        Command::Search { query } => search_once(config, &query).await,
    }
}
