//! Remote tool providers for the tool bridge.
//!
//! This crate implements the MCP protocol over JSON-RPC 2.0 (stdio or
//! HTTP/SSE) and a plain REST provider, both on the server side (serving a
//! `ToolCatalog`) and the client side (implementing `ToolProvider`).
//!
//! # Architecture
//!
//! - **types**: JSON-RPC 2.0 and MCP-specific protocol types
//! - **transport**: Pluggable transport layer (stdio, pipes, channels)
//! - **server**: MCP server wrapping a `ToolCatalog`
//! - **client**: Concurrent MCP client, usually over a server subprocess
//! - **http**: REST router and its reqwest client
//! - **sse**: MCP over HTTP with Server-Sent Events, router and client transport
//! - **error**: Unified error types
//!
//! # Usage
//!
//! ## Server
//! ```no_run
//! use std::sync::Arc;
//! use toolbridge_mcp::server::McpServer;
//! use toolbridge_mcp::transport;
//! use toolbridge_runtime::demo_catalog;
//!
//! # async fn example() {
//! let mut server = McpServer::new(Arc::new(demo_catalog().unwrap()));
//! let mut transport = transport::stdio();
//! server.run(&mut transport).await.unwrap();
//! # }
//! ```
//!
//! ## Client
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use toolbridge_mcp::client::McpClient;
//! use toolbridge_runtime::ToolBridge;
//!
//! # async fn example() {
//! let client = Arc::new(
//!     McpClient::spawn("toolbridge-provider", &["--transport".into(), "stdio".into()], Duration::from_secs(30))
//!         .await
//!         .unwrap(),
//! );
//! let registry = ToolBridge::new(client.clone()).integrate_tools().await.unwrap();
//! let reversed = registry.invoke("reverse", serde_json::json!({"input": "abc"})).await.unwrap();
//! client.shutdown().await.unwrap();
//! # }
//! ```

pub mod client;
pub mod error;
pub mod http;
pub mod server;
pub mod sse;
pub mod transport;
pub mod types;

pub use client::{McpClient, DEFAULT_REQUEST_TIMEOUT};
pub use error::McpError;
pub use http::{provider_router, serve, serve_with_shutdown, HttpToolProvider};
pub use server::McpServer;
pub use sse::{serve_sse_with_shutdown, sse_router, sse_url, SseTransport};
pub use transport::{
    ChannelTransport, LineTransport, McpTransport, MessageSink, MessageSource, StdioTransport,
};
pub use types::*;
