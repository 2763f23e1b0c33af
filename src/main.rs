use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use precision_builder::config::ServerConfig;
use precision_builder::server::{router, AppState, PARSE_REQUIREMENTS_PATH};
use precision_builder::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::parse();
    telemetry::init(config.verbose);

    let llm = config.llm_client();
    tracing::info!(url = %config.llm_base_url, model = llm.model(), "using LLM endpoint");
    if config.api_key.is_none() {
        tracing::warn!("LLM_API_KEY is not set; every request will fail until it is configured");
    }

    let app = router(AppState::new(Arc::new(llm)));

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    tracing::info!("listening on http://{}{}", config.bind, PARSE_REQUIREMENTS_PATH);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
