use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use jota_domain::config::Config;
use jota_gateway::api;
use jota_gateway::cli::{Cli, Command, ConfigCommand};
use jota_gateway::state::AppState;
use jota_inference::InferenceClientBuilder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            init_tracing();
            let (config, _config_path) = jota_gateway::cli::load_config()?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _config_path) = jota_gateway::cli::load_config()?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Some(Command::Version) => {
            println!("jota {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Initialize structured JSON tracing (only for the `serve` command).
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,jota_gateway=debug")),
        )
        .json()
        .init();
}

/// Start the orchestrator with the given configuration.
async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!(
        app = %config.app.name,
        env = %config.app.env,
        "Jota orchestrator starting"
    );

    // ── Conversation store ───────────────────────────────────────────
    let store = jota_db::create_store(&config.jota_db).context("creating JotaDB client")?;
    tracing::info!(url = %config.jota_db.base_url, "JotaDB client ready");

    // ── Inference transport ──────────────────────────────────────────
    let inference = Arc::new(
        InferenceClientBuilder::new()
            .config(&config.inference)
            .jota_db_url(config.jota_db.base_url.clone())
            .store(store.clone())
            .build()
            .map_err(|e| anyhow::anyhow!("initializing inference client: {e}"))?,
    );
    // Background loop with backoff; requests fail fast until it is ready.
    inference.connect();

    let state = AppState {
        config: config.clone(),
        store,
        inference: inference.clone(),
    };

    // ── Concurrency limit (backpressure protection) ──────────────────
    let max_concurrent = std::env::var("JOTA_MAX_CONCURRENT_REQUESTS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(256);
    tracing::info!(max_concurrent, "concurrency limit set");

    let app = api::router(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrent));

    // ── Bind ─────────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "Jota orchestrator listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("axum server error")?;

    // Drain the engine connection before exit; in-flight streams run their
    // partial-save path.
    inference.shutdown().await;
    tracing::info!("Jota orchestrator stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
