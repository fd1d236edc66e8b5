//! Integration tests for the bridge over an MCP session.
//!
//! Tests cover discovery, per-name dispatch, staleness after teardown,
//! malformed provider output and out-of-order responses on a shared session.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use toolbridge_mcp::{
    CallToolResult, ChannelTransport, InitializeResult, JsonRpcRequest, JsonRpcResponse,
    LineTransport, ListToolsResult, McpClient, McpServer, MessageSink, MessageSource, PeerInfo,
    RpcId, ToolInfo, PROTOCOL_VERSION,
};
use toolbridge_runtime::{demo_catalog, discover_tools, BridgeError, BridgeState, ToolBridge};

async fn serve_demo() -> (Arc<McpClient>, tokio::task::JoinHandle<()>) {
    let (client_side, mut server_side) = ChannelTransport::pair();
    let mut server = McpServer::new(Arc::new(demo_catalog().unwrap()));
    let handle = tokio::spawn(async move {
        server.run(&mut server_side).await.unwrap();
    });
    let client = McpClient::connect(client_side).await.unwrap();
    (Arc::new(client), handle)
}

#[tokio::test]
async fn reverse_and_add_through_registry() {
    let (client, server) = serve_demo().await;
    let bridge = ToolBridge::new(client.clone());
    assert_eq!(bridge.state(), BridgeState::Ready);

    let registry = bridge.integrate_tools().await.unwrap();
    assert_eq!(registry.names(), vec!["add", "echo", "reverse"]);

    let reversed = registry
        .invoke("reverse", json!({"input": "Python is fun!"}))
        .await
        .unwrap();
    assert_eq!(reversed.value, json!("!nuf si nohtyP"));

    let sum = registry.invoke("add", json!({"a": 123, "b": 456})).await.unwrap();
    assert_eq!(sum.value, json!(579));

    client.shutdown().await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn registry_goes_stale_after_shutdown() {
    let (client, _server) = serve_demo().await;
    let registry = ToolBridge::new(client.clone()).integrate_tools().await.unwrap();
    let stub = registry.get("echo").unwrap().clone();

    client.shutdown().await.unwrap();

    assert!(registry.is_stale());
    let err = registry.invoke("echo", json!({"input": "hi"})).await.unwrap_err();
    assert!(matches!(err, BridgeError::StaleRegistry(_)));
    let err = stub.call(json!({"input": "hi"})).await.unwrap_err();
    assert!(matches!(err, BridgeError::StaleRegistry(_)));
}

#[tokio::test]
async fn argument_mismatch_is_not_forwarded() {
    let (client, _server) = serve_demo().await;
    let registry = ToolBridge::new(client.clone()).integrate_tools().await.unwrap();

    let err = registry
        .invoke("add", json!({"a": 1, "b": 2, "c": 3}))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::ArgumentMismatch { .. }));
    assert!(client.is_connected());
}

#[tokio::test]
async fn bridge_over_duplex_pipes() {
    let (client_io, server_io) = tokio::io::duplex(4096);
    let (server_r, server_w) = tokio::io::split(server_io);
    let (client_r, client_w) = tokio::io::split(client_io);

    let server = tokio::spawn(async move {
        let mut transport = LineTransport::new(server_r, server_w);
        McpServer::new(Arc::new(demo_catalog().unwrap()))
            .run(&mut transport)
            .await
            .unwrap();
    });

    let client = Arc::new(McpClient::connect(LineTransport::new(client_r, client_w)).await.unwrap());
    let registry = ToolBridge::new(client.clone()).integrate_tools().await.unwrap();
    let echoed = registry.invoke("echo", json!({"input": "over pipes"})).await.unwrap();
    assert_eq!(echoed.value, json!("over pipes"));

    client.shutdown().await.unwrap();
    server.await.unwrap();
}

/// A server driven by hand from the test body.
struct FakeServer {
    transport: ChannelTransport,
}

impl FakeServer {
    /// Connect a client and answer its handshake.
    async fn connect() -> (Arc<McpClient>, Self) {
        let (client_side, mut transport) = ChannelTransport::pair();
        let connect = tokio::spawn(McpClient::connect_with_timeout(client_side, Duration::from_secs(5)));

        let init: JsonRpcRequest = serde_json::from_str(&transport.receive().await.unwrap().unwrap()).unwrap();
        assert_eq!(init.method, "initialize");
        let init_result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: json!({"tools": {}}),
            server_info: PeerInfo::new("fake", None),
        };
        let mut fake = Self { transport };
        fake.reply(init.id, serde_json::to_value(init_result).unwrap()).await;
        let client = Arc::new(connect.await.unwrap().unwrap());

        let initialized: Value = serde_json::from_str(&fake.transport.receive().await.unwrap().unwrap()).unwrap();
        assert_eq!(initialized["method"], "notifications/initialized");
        (client, fake)
    }

    async fn next_request(&mut self) -> JsonRpcRequest {
        serde_json::from_str(&self.transport.receive().await.unwrap().unwrap()).unwrap()
    }

    async fn reply(&mut self, id: RpcId, result: Value) {
        let line = serde_json::to_string(&JsonRpcResponse::success(id, result)).unwrap();
        self.transport.send(&line).await.unwrap();
    }

    /// Answer the next `tools/list` with `tools`.
    async fn list(&mut self, tools: Vec<ToolInfo>) {
        let list = self.next_request().await;
        assert_eq!(list.method, "tools/list");
        let listed = ListToolsResult {
            tools,
            next_cursor: None,
        };
        self.reply(list.id, serde_json::to_value(listed).unwrap()).await;
    }
}

fn tool(name: &str, input_schema: Value) -> ToolInfo {
    ToolInfo {
        name: name.to_string(),
        description: String::new(),
        input_schema,
    }
}

#[tokio::test]
async fn malformed_tool_list_is_protocol_error() {
    let (client, mut fake) = FakeServer::connect().await;
    let discover = {
        let client = client.clone();
        tokio::spawn(async move { discover_tools(client.as_ref()).await })
    };

    let list = fake.next_request().await;
    fake.reply(list.id, json!({"tools": "not a list"})).await;

    let err = discover.await.unwrap().unwrap_err();
    assert!(matches!(err, BridgeError::Protocol(_)), "{:?}", err);
    assert!(client.is_connected());
}

#[tokio::test]
async fn garbage_reply_is_protocol_error_not_timeout() {
    let (client, mut fake) = FakeServer::connect().await;
    let discover = {
        let client = client.clone();
        tokio::spawn(async move { discover_tools(client.as_ref()).await })
    };

    let _list = fake.next_request().await;
    fake.transport.send("this is not json").await.unwrap();

    let err = tokio::time::timeout(Duration::from_secs(2), discover)
        .await
        .expect("caller should fail before the request timeout")
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, BridgeError::Protocol(_)), "{:?}", err);
}

#[tokio::test]
async fn image_result_is_returned_unmodified() {
    let (client, mut fake) = FakeServer::connect().await;
    let integrate = {
        let client = client.clone();
        tokio::spawn(async move { ToolBridge::new(client).integrate_tools().await })
    };
    fake.list(vec![tool("snapshot", json!({"type": "object"}))]).await;
    let registry = integrate.await.unwrap().unwrap();

    let call = {
        let registry = Arc::new(registry);
        tokio::spawn(async move { registry.invoke("snapshot", json!({})).await })
    };
    let req = fake.next_request().await;
    assert_eq!(req.method, "tools/call");
    let blocks = json!([
        {"type": "image", "data": "iVBORw0K", "mimeType": "image/png"},
        {"type": "audio", "data": "UklGRg==", "mimeType": "audio/wav"}
    ]);
    fake.reply(req.id, json!({"content": blocks})).await;

    let result = call.await.unwrap().unwrap();
    assert_eq!(result.value, blocks);
}

/// Answer a batch of calls in reverse order of arrival.
#[tokio::test]
async fn out_of_order_responses_reach_their_callers() {
    let (client, mut fake) = FakeServer::connect().await;

    // Discovery
    let discover = {
        let client = client.clone();
        tokio::spawn(async move { ToolBridge::new(client).integrate_tools().await })
    };
    let tools: Vec<ToolInfo> = (0..4)
        .map(|i| {
            tool(
                &format!("tool_{}", i),
                json!({"type": "object", "properties": {"n": {"type": "integer"}}}),
            )
        })
        .collect();
    fake.list(tools).await;
    let registry = Arc::new(discover.await.unwrap().unwrap());

    let callers: Vec<_> = (0..4)
        .map(|i| {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .invoke(&format!("tool_{}", i), json!({"n": i}))
                    .await
            })
        })
        .collect();

    let mut requests = Vec::new();
    for _ in 0..4 {
        requests.push(fake.next_request().await);
    }
    for req in requests.into_iter().rev() {
        let params = req.params.unwrap();
        let answer = json!({"name": params["name"], "n": params["arguments"]["n"]});
        fake.reply(req.id, serde_json::to_value(CallToolResult::success(answer)).unwrap())
            .await;
    }

    for (i, caller) in callers.into_iter().enumerate() {
        let result = caller.await.unwrap().unwrap();
        assert_eq!(result.value, json!({"name": format!("tool_{}", i), "n": i}));
    }
}
