//! alumnium-mcp: Alumnium MCP server binary
//!
//! Usage:
//!   alumnium-mcp                  - Serve MCP over stdio
//!   alumnium-mcp --config PATH    - Serve with settings from a TOML file
//!   alumnium-mcp --help           - Show help

mod cli;

use std::sync::Arc;

use alumnium_core::{Config, ModelInterpreterFactory, SessionStore, ToolManager};
use alumnium_driver::DefaultDriverFactory;
use alumnium_mcp::AlumniumServer;
use alumnium_tools::register_alumnium_tools;
use tracing_subscriber::EnvFilter;

use cli::RunMode;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mode = cli::parse_args(std::env::args().skip(1)).map_err(|e| anyhow::anyhow!(e))?;

    let config_path = match mode {
        RunMode::Help => {
            cli::print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("alumnium-mcp {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        RunMode::Serve { config } => config,
    };

    // Load .env before anything reads the environment
    dotenvy::dotenv().ok();

    // stdout carries the MCP stream
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = Config::load(config_path.as_deref())
        .map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Starting alumnium-mcp {}", env!("CARGO_PKG_VERSION"));
    tracing::info!(model = %config.model.id(), "Model configured");

    let store = Arc::new(SessionStore::new(
        Arc::new(DefaultDriverFactory::new(&config)),
        Arc::new(ModelInterpreterFactory::new(&config)),
        config.model.clone(),
    ));

    let mut tool_manager = ToolManager::new();
    register_alumnium_tools(&mut tool_manager, store.clone());
    tracing::info!(
        "Registered {} tools: {:?}",
        tool_manager.len(),
        tool_manager.tool_names()
    );

    let server = AlumniumServer::new(Arc::new(tool_manager));

    let outcome = tokio::select! {
        result = server.serve_stdio() => result,
        signal = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down...");
            signal.map_err(anyhow::Error::from)
        }
    };

    // Close every browser and Appium session left open by the client
    store.shutdown().await;
    tracing::info!("Shutdown complete");

    outcome
}
