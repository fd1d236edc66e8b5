//! Error taxonomy for tool discovery and invocation.

/// Errors surfaced by the tool bridge.
///
/// Nothing is retried or swallowed inside the bridge; every variant reaches
/// the immediate caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// The provider cannot be reached (or the session is not established).
    #[error("Connection error: {0}")]
    Connection(String),

    /// The provider answered with something that could not be parsed.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A descriptor's input schema is malformed, or names collide.
    #[error("Schema error for tool '{tool}': {reason}")]
    Schema { tool: String, reason: String },

    /// The name is not present in the registry (or not known to the provider).
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Supplied arguments do not match the tool's declared parameters.
    #[error("Argument mismatch for tool '{tool}': {reason}")]
    ArgumentMismatch { tool: String, reason: String },

    /// The registry outlived the session it was built from.
    #[error("Stale registry: session for tool '{0}' has been torn down")]
    StaleRegistry(String),

    /// The provider ran the tool and reported a failure.
    #[error("Tool execution error: {tool} - {message}")]
    ToolExecution { tool: String, message: String },
}

impl BridgeError {
    pub fn schema(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Schema {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    pub fn argument_mismatch(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ArgumentMismatch {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error means the tool name cannot be resolved, either
    /// because it never existed or because its session expired.
    pub fn is_dead_tool(&self) -> bool {
        matches!(self, Self::UnknownTool(_) | Self::StaleRegistry(_))
    }

    /// Whether the failure happened at the transport level.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Protocol(_))
    }
}
