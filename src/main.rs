use std::sync::Arc;

use clap::Parser;
use fm_bridge::cli::Cli;
use fm_bridge::config::Config;
use fm_bridge::credentials::EnvCredentialProvider;
use fm_bridge::engine::Engine;
use fm_bridge::mcp::BridgeMcpServer;
use rmcp::ServiceExt;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let log_level = cli.log_level.clone().unwrap_or(config.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let engine = Arc::new(Engine::with_row_cap(Box::new(EnvCredentialProvider::from_env()), config.row_cap));
    let result = match &cli.tenant {
        Some(name) => engine.use_tenant(name).await,
        None => engine.bootstrap_default_tenant().await,
    };
    match result {
        Ok(msg) => info!("{msg}"),
        Err(e) => error!("startup tenant connection failed: {}", e.to_message(None)),
    }

    info!("starting MCP server over stdio");
    let server = BridgeMcpServer::new(engine).serve(rmcp::transport::stdio()).await?;
    server.waiting().await?;
    Ok(())
}
