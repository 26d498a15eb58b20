use anyhow::{Context, Result};
use clap::Parser;

mod bootstrap;
mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = cli::Args::parse();
    let mut config = aar_common::GatewayConfig::load(&args.config)
        .with_context(|| format!("failed to load {}", args.config))?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let state = bootstrap::build_state(&config).await?;
    let app = aar_server::router(state);

    let bind = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    tracing::info!(%bind, "auto-ai-router listening");
    axum::serve(listener, app).await?;
    Ok(())
}
