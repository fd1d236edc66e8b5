//! toolbridge: connect to a tool provider, integrate its tools and call
//! `reverse` and `add`.
//!
//! The provider session is torn down on every exit path, including failures
//! during discovery or invocation.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Number;
use tracing::warn;

use toolbridge_cli::demo::{run_demo, DemoRequest};
use toolbridge_cli::init_tracing;
use toolbridge_core::config::load_dotenv;
use toolbridge_core::{BridgeConfig, DuplicatePolicy, TransportKind};
use toolbridge_mcp::{sse_url, HttpToolProvider, McpClient, SseTransport};

// ── CLI ─────────────────────────────────────────────────────────────

/// Tool bridge demo client.
#[derive(Parser, Debug)]
#[command(name = "toolbridge", version, about)]
struct Cli {
    /// Config profile; keys are looked up as {PROFILE}_{KEY} first.
    #[arg(long, env = "TOOLBRIDGE_PROFILE")]
    profile: Option<String>,

    /// How to reach the provider: http, stdio or sse.
    #[arg(long)]
    transport: Option<TransportKind>,

    /// Base URL of a REST or SSE provider.
    #[arg(long)]
    url: Option<String>,

    /// Command line that starts an MCP provider on stdio.
    #[arg(long)]
    command: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Plugin name the tools are grouped under.
    #[arg(long)]
    plugin: Option<String>,

    /// Duplicate tool names: reject or last_write_wins.
    #[arg(long)]
    duplicates: Option<DuplicatePolicy>,

    /// Text passed to `reverse`.
    #[arg(long, default_value = "Python is fun!")]
    input: String,

    /// First operand for `add`.
    #[arg(long, default_value = "123", allow_negative_numbers = true)]
    a: Number,

    /// Second operand for `add`.
    #[arg(long, default_value = "456", allow_negative_numbers = true)]
    b: Number,

    /// Only list the discovered tools.
    #[arg(long)]
    list: bool,
}

impl Cli {
    fn config(&self) -> BridgeConfig {
        let mut config = BridgeConfig::for_profile(self.profile.as_deref().unwrap_or(""));
        if let Some(transport) = self.transport {
            config.provider.transport = transport;
        }
        if let Some(url) = &self.url {
            config.provider.url = url.clone();
        }
        if let Some(command) = &self.command {
            config.provider.command = command.clone();
        }
        if let Some(timeout) = self.timeout {
            config.provider.request_timeout_secs = timeout;
        }
        if let Some(plugin) = &self.plugin {
            config.registry.plugin_name = plugin.clone();
        }
        if let Some(policy) = self.duplicates {
            config.registry.duplicate_tools = policy;
        }
        config
    }

    fn request(&self) -> DemoRequest {
        DemoRequest {
            input: self.input.clone(),
            a: self.a.clone(),
            b: self.b.clone(),
            list_only: self.list,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    let cli = Cli::parse();
    init_tracing("warn");

    let config = cli.config();
    config.log_summary();
    let request = cli.request();
    let timeout = config.provider.request_timeout();
    let mut stdout = std::io::stdout().lock();

    match config.provider.transport {
        TransportKind::Http => {
            let provider = Arc::new(
                HttpToolProvider::connect(&config.provider.url, timeout)
                    .await
                    .with_context(|| format!("failed to reach provider at {}", config.provider.url))?,
            );
            let outcome = run_demo(provider.clone(), config.registry.clone(), &request, &mut stdout).await;
            provider.close();
            outcome
        }
        TransportKind::Stdio => {
            let (program, args) = config
                .provider
                .command_parts()
                .context("provider command is empty")?;
            let client = Arc::new(
                McpClient::spawn(&program, &args, timeout)
                    .await
                    .with_context(|| format!("failed to start provider '{}'", config.provider.command))?,
            );
            let outcome = run_demo(client.clone(), config.registry.clone(), &request, &mut stdout).await;
            if let Err(e) = client.shutdown().await {
                warn!(error = %e, "Provider shutdown failed");
            }
            outcome
        }
        TransportKind::Sse => {
            let url = sse_url(&config.provider.url);
            let transport = SseTransport::connect(&url, timeout)
                .await
                .with_context(|| format!("failed to open event stream at {}", url))?;
            let client = Arc::new(
                McpClient::connect_with_timeout(transport, timeout)
                    .await
                    .with_context(|| format!("MCP handshake with {} failed", url))?,
            );
            let outcome = run_demo(client.clone(), config.registry.clone(), &request, &mut stdout).await;
            if let Err(e) = client.shutdown().await {
                warn!(error = %e, "Provider shutdown failed");
            }
            outcome
        }
    }
}
