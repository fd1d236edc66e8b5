use async_trait::async_trait;

use crate::error::BridgeError;
use crate::session::SessionToken;
use crate::tool::{ToolDescriptor, ToolInvocation, ToolResult};

/// A remote endpoint exposing a catalog of callable tools.
///
/// This trait lives in tool-runtime because the bridge defines what it
/// needs from a provider. Wire implementations (MCP JSON-RPC, REST) live in
/// `toolbridge-mcp`. Implementations own the transport: they decide when
/// the session token opens and closes, and they own any retry policy.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Fetch the provider's full current catalog.
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BridgeError>;

    /// Run one tool remotely and return its result unmodified.
    async fn call_tool(&self, invocation: ToolInvocation) -> Result<ToolResult, BridgeError>;

    /// Liveness of the session this provider is speaking over.
    fn session(&self) -> SessionToken;

    /// Provider name for logging/debugging (e.g., "mcp", "http").
    fn provider_name(&self) -> &str;
}
