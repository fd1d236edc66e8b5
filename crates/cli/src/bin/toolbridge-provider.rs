//! toolbridge-provider: serve the demo tools (`echo`, `reverse`, `add`).
//!
//! - `--transport http`: REST provider (`GET /tools`, `POST /execute`)
//! - `--transport stdio`: MCP JSON-RPC over stdin/stdout, for spawning by a client
//! - `--transport sse`: MCP JSON-RPC over HTTP (`GET /sse`, `POST /messages`)

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use toolbridge_cli::init_tracing;
use toolbridge_core::config::load_dotenv;
use toolbridge_core::{BridgeConfig, TransportKind};
use toolbridge_mcp::{serve_sse_with_shutdown, serve_with_shutdown, transport, McpServer};
use toolbridge_runtime::demo_catalog;

// ── CLI ─────────────────────────────────────────────────────────────

/// Demo tool provider.
#[derive(Parser, Debug)]
#[command(name = "toolbridge-provider", version, about)]
struct Cli {
    /// Config profile; keys are looked up as {PROFILE}_{KEY} first.
    #[arg(long, env = "TOOLBRIDGE_PROFILE")]
    profile: Option<String>,

    /// How to serve the tools: http, stdio or sse.
    #[arg(long)]
    transport: Option<TransportKind>,

    /// Bind host for the HTTP providers.
    #[arg(long)]
    host: Option<String>,

    /// Bind port for the HTTP providers.
    #[arg(long)]
    port: Option<u16>,
}

impl Cli {
    fn config(&self) -> BridgeConfig {
        let mut config = BridgeConfig::for_profile(self.profile.as_deref().unwrap_or(""));
        if let Some(transport) = self.transport {
            config.provider.transport = transport;
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    let cli = Cli::parse();
    init_tracing("info");

    let config = cli.config();
    config.log_summary();
    let catalog = Arc::new(demo_catalog().context("failed to build demo catalog")?);

    match config.provider.transport {
        TransportKind::Stdio => {
            let mut transport = transport::stdio();
            McpServer::new(catalog)
                .run(&mut transport)
                .await
                .context("MCP server failed")?;
        }
        TransportKind::Http => {
            let addr = config.server.bind_addr();
            let listener = TcpListener::bind(&addr)
                .await
                .with_context(|| format!("failed to bind {}", addr))?;
            info!(addr = %addr, "REST tool provider listening");
            serve_with_shutdown(listener, catalog, shutdown_signal())
                .await
                .context("REST provider failed")?;
        }
        TransportKind::Sse => {
            let addr = config.server.bind_addr();
            let listener = TcpListener::bind(&addr)
                .await
                .with_context(|| format!("failed to bind {}", addr))?;
            info!(addr = %addr, "MCP SSE provider listening");
            serve_sse_with_shutdown(listener, catalog, shutdown_signal())
                .await
                .context("SSE provider failed")?;
        }
    }

    info!("Provider stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
