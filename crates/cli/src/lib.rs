//! Shared pieces of the `toolbridge` and `toolbridge-provider` binaries.

pub mod demo;

/// Initialize tracing on stderr.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` applies. Output never
/// goes to stdout, which carries MCP traffic in stdio mode and tool results in
/// the client.
pub fn init_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
