//! MCP server implementation.
//!
//! Wraps a `ToolCatalog` and exposes its tools over the MCP protocol.
//! Handles JSON-RPC requests and dispatches them to the appropriate handlers.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use toolbridge_runtime::{ToolCatalog, ToolError};

use crate::error::McpError;
use crate::transport::McpTransport;
use crate::types::*;

/// MCP server that serves a `ToolCatalog` to MCP clients.
pub struct McpServer {
    catalog: Arc<ToolCatalog>,
    server_name: String,
    server_version: String,
    initialized: bool,
}

impl McpServer {
    /// Create a new MCP server serving the given catalog.
    pub fn new(catalog: Arc<ToolCatalog>) -> Self {
        Self {
            catalog,
            server_name: "toolbridge-provider".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            initialized: false,
        }
    }

    /// Set the server name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Run the server loop, reading from and writing to the transport.
    ///
    /// Processes JSON-RPC requests until the transport is closed.
    pub async fn run<T: McpTransport>(&mut self, transport: &mut T) -> Result<(), McpError> {
        tracing::info!(server = %self.server_name, tools = self.catalog.len(), "MCP server starting");

        loop {
            let line = match transport.receive().await? {
                Some(line) => line,
                None => {
                    tracing::info!("Transport closed, shutting down");
                    break;
                }
            };

            tracing::debug!(message = %line, "Received message");

            // Distinguish requests (have "id") from notifications (no "id")
            // by parsing as generic Value first.
            let raw: Value = match serde_json::from_str(&line) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to parse JSON");
                    let resp = parse_error_response(McpError::JsonParse(e));
                    transport.send(&serde_json::to_string(&resp)?).await?;
                    continue;
                }
            };

            if raw.get("id").is_none() {
                if let Ok(notif) = serde_json::from_value::<JsonRpcNotification>(raw) {
                    self.handle_notification(&notif);
                }
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_value(raw) {
                Ok(req) => req,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to parse JSON-RPC request");
                    let resp = parse_error_response(McpError::JsonParse(e));
                    transport.send(&serde_json::to_string(&resp)?).await?;
                    continue;
                }
            };

            let response = self.handle_request(&request).await;
            let json = serde_json::to_string(&response)?;
            tracing::debug!(response = %json, "Sending response");
            transport.send(&json).await?;
        }

        Ok(())
    }

    /// Handle a single JSON-RPC request and produce a response.
    pub async fn handle_request(&mut self, request: &JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();

        match request.method.as_str() {
            "initialize" => self.handle_initialize(id, &request.params),
            "ping" => JsonRpcResponse::success(id, Value::Object(Default::default())),
            "tools/list" | "tools/call" if !self.initialized => {
                tracing::warn!(method = %request.method, "Request before initialize");
                error_response(id, McpError::NotInitialized)
            }
            "tools/list" => self.handle_list_tools(id),
            "tools/call" => self.handle_call_tool(id, &request.params).await,
            method => {
                tracing::warn!(method = %method, "Unknown method");
                error_response(id, McpError::MethodNotFound(method.to_string()))
            }
        }
    }

    fn handle_notification(&mut self, notif: &JsonRpcNotification) {
        match notif.method.as_str() {
            "notifications/initialized" => {
                tracing::info!("Client confirmed initialization");
            }
            "notifications/cancelled" => {
                tracing::debug!("Client cancelled a request");
            }
            method => {
                tracing::debug!(method = %method, "Unknown notification, ignoring");
            }
        }
    }

    fn handle_initialize(&mut self, id: RpcId, params: &Option<Value>) -> JsonRpcResponse {
        if let Some(params) = params {
            match serde_json::from_value::<InitializeParams>(params.clone()) {
                Ok(p) => tracing::info!(
                    client = %p.client_info.name,
                    protocol = %p.protocol_version,
                    "Handling initialize"
                ),
                Err(e) => {
                    return error_response(id, McpError::InvalidParams(e.to_string()));
                }
            }
        }
        self.initialized = true;

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: serde_json::json!({ "tools": {} }),
            server_info: PeerInfo::new(self.server_name.clone(), Some(self.server_version.clone())),
        };
        success_response(id, result)
    }

    fn handle_list_tools(&self, id: RpcId) -> JsonRpcResponse {
        tracing::debug!("Handling tools/list");

        let tools: Vec<ToolInfo> = self.catalog.list().into_iter().map(ToolInfo::from).collect();
        success_response(
            id,
            ListToolsResult {
                tools,
                next_cursor: None,
            },
        )
    }

    async fn handle_call_tool(&self, id: RpcId, params: &Option<Value>) -> JsonRpcResponse {
        let params = match params {
            Some(p) => p,
            None => {
                return error_response(id, McpError::InvalidParams("missing params".to_string()));
            }
        };

        let call_params: CallToolParams = match serde_json::from_value(params.clone()) {
            Ok(p) => p,
            Err(e) => return error_response(id, McpError::InvalidParams(e.to_string())),
        };

        tracing::debug!(tool = %call_params.name, "Handling tools/call");

        let tool = match self.catalog.get(&call_params.name) {
            Some(t) => t,
            None => return error_response(id, McpError::ToolNotFound(call_params.name)),
        };

        let arguments = match call_params.arguments {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };

        let result = match tool.execute(arguments).await {
            Ok(value) => CallToolResult::success(value),
            Err(e @ ToolError::InvalidInput(_)) => {
                tracing::debug!(tool = %call_params.name, error = %e, "Rejected tool input");
                CallToolResult::failure(e.to_string())
            }
            Err(e) => {
                tracing::warn!(tool = %call_params.name, error = %e, "Tool execution failed");
                CallToolResult::failure(e.to_string())
            }
        };
        success_response(id, result)
    }
}

fn success_response(id: RpcId, result: impl Serialize) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(val) => JsonRpcResponse::success(id, val),
        Err(e) => error_response(id, McpError::JsonParse(e)),
    }
}

fn error_response(id: RpcId, err: McpError) -> JsonRpcResponse {
    let rpc = err.to_rpc_error();
    JsonRpcResponse::error(id, rpc.code, rpc.message)
}

fn parse_error_response(err: McpError) -> JsonRpcResponse {
    error_response(RpcId::Number(0), err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ChannelTransport, MessageSink, MessageSource};
    use serde_json::json;
    use toolbridge_runtime::demo_catalog;

    fn test_server() -> McpServer {
        McpServer::new(Arc::new(demo_catalog().unwrap()))
    }

    fn init_request(id: i64) -> JsonRpcRequest {
        JsonRpcRequest::new(
            RpcId::Number(id),
            "initialize",
            Some(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {"name": "test-client"}
            })),
        )
    }

    async fn initialized_server() -> McpServer {
        let mut server = test_server();
        let resp = server.handle_request(&init_request(1)).await;
        assert!(resp.error.is_none());
        server
    }

    #[tokio::test]
    async fn test_handle_initialize() {
        let mut server = test_server();
        let resp = server.handle_request(&init_request(1)).await;
        assert!(resp.error.is_none());
        assert!(server.is_initialized());
        let result: InitializeResult = serde_json::from_value(resp.result.unwrap()).unwrap();
        assert_eq!(result.protocol_version, PROTOCOL_VERSION);
        assert_eq!(result.server_info.name, "toolbridge-provider");
        assert!(result.capabilities.get("tools").is_some());
    }

    #[tokio::test]
    async fn test_tools_require_initialize() {
        let mut server = test_server();
        let req = JsonRpcRequest::new(RpcId::Number(1), "tools/list", None);
        let resp = server.handle_request(&req).await;
        assert_eq!(resp.error.unwrap().code, error_codes::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_handle_list_tools() {
        let mut server = initialized_server().await;
        let req = JsonRpcRequest::new(RpcId::Number(2), "tools/list", None);

        let resp = server.handle_request(&req).await;
        assert!(resp.error.is_none());
        let result: ListToolsResult = serde_json::from_value(resp.result.unwrap()).unwrap();
        let names: Vec<_> = result.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["add", "echo", "reverse"]);
        assert!(result.tools[0].input_schema.get("properties").is_some());
    }

    #[tokio::test]
    async fn test_handle_call_tool() {
        let mut server = initialized_server().await;
        let req = JsonRpcRequest::new(
            RpcId::Number(3),
            "tools/call",
            Some(json!({
                "name": "reverse",
                "arguments": {"input": "hello mcp"}
            })),
        );

        let resp = server.handle_request(&req).await;
        assert!(resp.error.is_none());
        let result: CallToolResult = serde_json::from_value(resp.result.unwrap()).unwrap();
        assert!(!result.is_error);
        assert_eq!(result.text().as_deref(), Some("pcm olleh"));
        assert_eq!(result.structured_content, Some(json!("pcm olleh")));
    }

    #[tokio::test]
    async fn test_handle_call_tool_not_found() {
        let mut server = initialized_server().await;
        let req = JsonRpcRequest::new(
            RpcId::Number(4),
            "tools/call",
            Some(json!({
                "name": "nonexistent",
                "arguments": {}
            })),
        );

        let resp = server.handle_request(&req).await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, error_codes::INVALID_PARAMS);
        assert_eq!(err.message, "Tool not found: nonexistent");
    }

    #[tokio::test]
    async fn test_handle_call_tool_bad_input() {
        let mut server = initialized_server().await;
        let req = JsonRpcRequest::new(
            RpcId::Number(5),
            "tools/call",
            Some(json!({"name": "add", "arguments": {"a": "x", "b": 1}})),
        );

        let resp = server.handle_request(&req).await;
        assert!(resp.error.is_none());
        let result: CallToolResult = serde_json::from_value(resp.result.unwrap()).unwrap();
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn test_handle_unknown_method() {
        let mut server = test_server();
        let req = JsonRpcRequest::new(RpcId::Number(6), "unknown/method", None);

        let resp = server.handle_request(&req).await;
        assert_eq!(resp.error.unwrap().code, error_codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_server_run_with_channel_transport() {
        let (mut client_side, mut server_side) = ChannelTransport::pair();
        let mut server = test_server();

        let server_handle = tokio::spawn(async move { server.run(&mut server_side).await });

        client_side
            .send(&serde_json::to_string(&init_request(1)).unwrap())
            .await
            .unwrap();
        let resp_line = client_side.receive().await.unwrap().unwrap();
        let resp: JsonRpcResponse = serde_json::from_str(&resp_line).unwrap();
        assert!(resp.error.is_none());

        // Malformed input gets a parse error and the loop keeps going.
        client_side.send("{not json").await.unwrap();
        let resp_line = client_side.receive().await.unwrap().unwrap();
        let resp: JsonRpcResponse = serde_json::from_str(&resp_line).unwrap();
        assert_eq!(resp.error.unwrap().code, error_codes::PARSE_ERROR);

        let call_req = JsonRpcRequest::new(
            RpcId::Number(2),
            "tools/call",
            Some(json!({
                "name": "echo",
                "arguments": {"input": "via transport"}
            })),
        );
        client_side
            .send(&serde_json::to_string(&call_req).unwrap())
            .await
            .unwrap();

        let resp_line = client_side.receive().await.unwrap().unwrap();
        let resp: JsonRpcResponse = serde_json::from_str(&resp_line).unwrap();
        assert_eq!(resp.id, RpcId::Number(2));
        let result: CallToolResult = serde_json::from_value(resp.result.unwrap()).unwrap();
        assert_eq!(result.into_value(), json!("via transport"));

        drop(client_side);
        server_handle.await.unwrap().unwrap();
    }
}
