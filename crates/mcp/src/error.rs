//! Error types for the MCP crate.

use std::time::Duration;

use toolbridge_runtime::BridgeError;

use crate::types::{error_codes, JsonRpcError};

/// Errors that can occur during MCP operations.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// Failed to parse JSON.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Transport I/O error.
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The requested method is not supported.
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Invalid parameters for a method.
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// The requested tool was not found in the catalog.
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Server/client not initialized.
    #[error("Not initialized: call initialize first")]
    NotInitialized,

    /// The MCP server process exited or is unavailable.
    #[error("Server unavailable: {0}")]
    ServerUnavailable(String),

    /// The peer answered with a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// A response was well-formed JSON but not a valid reply.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// No response arrived within the request timeout.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The session has been torn down.
    #[error("Session closed")]
    Closed,
}

impl McpError {
    /// Convert to a JSON-RPC error object.
    pub fn to_rpc_error(&self) -> JsonRpcError {
        let (code, message) = match self {
            McpError::JsonParse(_) => (error_codes::PARSE_ERROR, self.to_string()),
            McpError::MethodNotFound(_) => (error_codes::METHOD_NOT_FOUND, self.to_string()),
            McpError::InvalidParams(_) => (error_codes::INVALID_PARAMS, self.to_string()),
            McpError::ToolNotFound(_) => (error_codes::INVALID_PARAMS, self.to_string()),
            McpError::NotInitialized => (error_codes::INVALID_REQUEST, self.to_string()),
            McpError::Rpc { code, message } => (*code, message.clone()),
            _ => (error_codes::INTERNAL_ERROR, self.to_string()),
        };
        JsonRpcError {
            code,
            message,
            data: None,
        }
    }

    /// Whether a JSON-RPC error reply means the named tool does not exist.
    pub fn is_tool_not_found(&self) -> bool {
        match self {
            McpError::ToolNotFound(_) => true,
            McpError::Rpc { code, message } => {
                *code == error_codes::INVALID_PARAMS && message.starts_with("Tool not found")
            }
            _ => false,
        }
    }
}

impl From<McpError> for BridgeError {
    fn from(err: McpError) -> Self {
        match err {
            McpError::Transport(_)
            | McpError::ServerUnavailable(_)
            | McpError::NotInitialized
            | McpError::Timeout(_)
            | McpError::Closed => BridgeError::Connection(err.to_string()),
            McpError::ToolNotFound(name) => BridgeError::UnknownTool(name),
            McpError::JsonParse(_)
            | McpError::MethodNotFound(_)
            | McpError::InvalidParams(_)
            | McpError::Rpc { .. }
            | McpError::InvalidResponse(_) => BridgeError::Protocol(err.to_string()),
        }
    }
}
