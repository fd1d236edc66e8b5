//! MCP client implementation.
//!
//! Connects to an MCP server over any [`McpTransport`] (usually a child
//! process's stdio), performs the initialize handshake and implements
//! [`ToolProvider`] so the bridge can discover and call remote tools.
//!
//! Requests are multiplexed: each one registers a oneshot sender under its
//! id and a background reader task routes responses back as they arrive,
//! in whatever order the server answers.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use toolbridge_runtime::{
    BridgeError, SessionToken, ToolDescriptor, ToolInvocation, ToolProvider, ToolResult,
};

use crate::error::McpError;
use crate::transport::{LineTransport, McpTransport, MessageSink, MessageSource};
use crate::types::*;

/// Default time to wait for a single response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How long `shutdown` waits for a spawned server to exit on its own.
const CHILD_EXIT_GRACE: Duration = Duration::from_secs(2);

type ResponseSender = oneshot::Sender<Result<JsonRpcResponse, McpError>>;
type PendingMap = Arc<Mutex<HashMap<RpcId, ResponseSender>>>;

fn lock_pending(pending: &Mutex<HashMap<RpcId, ResponseSender>>) -> MutexGuard<'_, HashMap<RpcId, ResponseSender>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes a pending entry when its request finishes, times out or is
/// cancelled by the caller dropping the future.
struct PendingGuard<'a> {
    pending: &'a Mutex<HashMap<RpcId, ResponseSender>>,
    id: RpcId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock_pending(self.pending).remove(&self.id);
    }
}

/// An MCP client session.
pub struct McpClient {
    outbound: tokio::sync::Mutex<Box<dyn MessageSink>>,
    pending: PendingMap,
    next_id: AtomicI64,
    session: SessionToken,
    reader: Mutex<Option<JoinHandle<()>>>,
    child: Mutex<Option<Child>>,
    request_timeout: Duration,
    server_info: OnceLock<InitializeResult>,
}

impl McpClient {
    /// Connect over an established transport and run the handshake.
    pub async fn connect<T: McpTransport + 'static>(transport: T) -> Result<Self, McpError> {
        Self::connect_with_timeout(transport, DEFAULT_REQUEST_TIMEOUT).await
    }

    pub async fn connect_with_timeout<T: McpTransport + 'static>(
        transport: T,
        request_timeout: Duration,
    ) -> Result<Self, McpError> {
        let (source, sink) = Box::new(transport).split();
        let client = Self::start(source, sink, None, request_timeout);
        client.initialize().await?;
        Ok(client)
    }

    /// Spawn an MCP server process and connect to its stdio.
    ///
    /// The child is killed when the client is dropped.
    pub async fn spawn(
        program: &str,
        args: &[String],
        request_timeout: Duration,
    ) -> Result<Self, McpError> {
        tracing::info!(program = %program, args = ?args, "Spawning MCP server process");

        let mut child = Command::new(program)
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| McpError::ServerUnavailable(format!("failed to spawn '{}': {}", program, e)))?;

        let stdin = child.stdin.take().ok_or_else(|| {
            McpError::ServerUnavailable("Failed to capture server stdin".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            McpError::ServerUnavailable("Failed to capture server stdout".to_string())
        })?;

        let (source, sink) = Box::new(LineTransport::new(stdout, stdin)).split();
        let client = Self::start(source, sink, Some(child), request_timeout);
        client.initialize().await?;
        Ok(client)
    }

    fn start(
        source: Box<dyn MessageSource>,
        sink: Box<dyn MessageSink>,
        child: Option<Child>,
        request_timeout: Duration,
    ) -> Self {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let session = SessionToken::open();
        let reader = tokio::spawn(read_loop(source, Arc::clone(&pending), session.clone()));

        Self {
            outbound: tokio::sync::Mutex::new(sink),
            pending,
            next_id: AtomicI64::new(1),
            session,
            reader: Mutex::new(Some(reader)),
            child: Mutex::new(child),
            request_timeout,
            server_info: OnceLock::new(),
        }
    }

    /// What the server reported during the handshake.
    pub fn server_info(&self) -> Option<&InitializeResult> {
        self.server_info.get()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_open()
    }

    /// Send a JSON-RPC request and wait for its matching response.
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        if !self.session.is_open() {
            return Err(McpError::Closed);
        }

        let id = RpcId::Number(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        lock_pending(&self.pending).insert(id.clone(), tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id: id.clone(),
        };

        // The reader may have drained the map between the check above and
        // the insert.
        if !self.session.is_open() {
            return Err(McpError::Closed);
        }

        let json = serde_json::to_string(&JsonRpcRequest::new(id.clone(), method, params))?;
        tracing::debug!(method = %method, id = %id, "Sending request");
        self.outbound.lock().await.send(&json).await?;

        let response = match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(outcome)) => outcome?,
            Ok(Err(_)) => return Err(McpError::Closed),
            Err(_) => {
                tracing::warn!(method = %method, id = %id, "Request timed out");
                return Err(McpError::Timeout(self.request_timeout));
            }
        };

        if let Some(err) = response.error {
            return Err(McpError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        response
            .result
            .ok_or_else(|| McpError::InvalidResponse(format!("'{}' response has no result", method)))
    }

    /// Send a JSON-RPC notification (no response expected).
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        let json = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        self.outbound.lock().await.send(&json).await
    }

    /// Perform MCP initialization handshake.
    async fn initialize(&self) -> Result<(), McpError> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: Value::Object(Default::default()),
            client_info: PeerInfo::new("toolbridge", Some(env!("CARGO_PKG_VERSION").to_string())),
        };

        let value = self
            .request("initialize", Some(serde_json::to_value(params)?))
            .await
            .map_err(|e| match e {
                McpError::Rpc { message, .. } => McpError::ServerUnavailable(message),
                other => other,
            })?;
        let result: InitializeResult = serde_json::from_value(value)?;
        if result.protocol_version != PROTOCOL_VERSION {
            tracing::warn!(
                server = %result.protocol_version,
                client = %PROTOCOL_VERSION,
                "MCP protocol version differs from server"
            );
        }

        self.notify("notifications/initialized", None).await?;

        tracing::info!(
            server = %result.server_info.name,
            version = ?result.server_info.version,
            "MCP client initialized"
        );
        let _ = self.server_info.set(result);
        Ok(())
    }

    /// Fetch every tool the server advertises, following pagination cursors.
    ///
    /// A cursor the server already handed out is a protocol error.
    pub async fn tools_list(&self) -> Result<Vec<ToolInfo>, McpError> {
        let mut tools = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = None;
        loop {
            let params = serde_json::to_value(ListToolsParams { cursor })?;
            let value = self.request("tools/list", Some(params)).await?;
            let page: ListToolsResult = serde_json::from_value(value)?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !seen.insert(next.clone()) => {
                    return Err(McpError::InvalidResponse(format!(
                        "tools/list repeated cursor '{}'",
                        next
                    )));
                }
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        tracing::debug!(count = tools.len(), "Listed remote tools");
        Ok(tools)
    }

    /// Call a tool on the remote MCP server.
    pub async fn tools_call(&self, name: &str, arguments: Value) -> Result<CallToolResult, McpError> {
        let params = serde_json::to_value(CallToolParams {
            name: name.to_string(),
            arguments,
        })?;
        let value = self.request("tools/call", Some(params)).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// End the session: stubs go stale, in-flight requests fail with
    /// [`McpError::Closed`] and a spawned server is reaped.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self) -> Result<(), McpError> {
        let was_open = self.session.close();

        if let Err(e) = self.outbound.lock().await.close().await {
            tracing::debug!(error = %e, "Closing MCP transport failed");
        }

        let reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = reader {
            handle.abort();
        }
        fail_pending(&self.pending, || McpError::Closed);

        let child = self.child.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(mut child) = child {
            match tokio::time::timeout(CHILD_EXIT_GRACE, child.wait()).await {
                Ok(Ok(status)) => tracing::debug!(status = %status, "MCP server exited"),
                _ => {
                    tracing::warn!("MCP server did not exit, killing it");
                    child.kill().await?;
                }
            }
        }

        if was_open {
            tracing::info!("MCP session closed");
        }
        Ok(())
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        self.session.close();
        let slot = self.reader.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }
}

async fn read_loop(mut source: Box<dyn MessageSource>, pending: PendingMap, session: SessionToken) {
    loop {
        match source.receive().await {
            Ok(Some(line)) => dispatch(&line, &pending),
            Ok(None) => {
                tracing::info!("MCP server closed the connection");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "MCP transport read failed");
                break;
            }
        }
    }
    session.close();
    fail_pending(&pending, || McpError::Closed);
}

/// Route one incoming line to the request waiting for it.
///
/// A line that cannot be matched to a request fails every request in
/// flight, since its intended receiver is unknown.
fn dispatch(line: &str, pending: &Mutex<HashMap<RpcId, ResponseSender>>) {
    let raw: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "Unparseable message from server");
            fail_pending(pending, || {
                McpError::InvalidResponse(format!("unparseable message from server: {}", e))
            });
            return;
        }
    };

    // Notifications and server-initiated requests are not supported.
    if raw.get("method").is_some() {
        tracing::debug!(method = ?raw.get("method"), "Ignoring server message");
        return;
    }
    let id = match raw.get("id").cloned().map(serde_json::from_value::<RpcId>) {
        Some(Ok(id)) => id,
        _ => {
            tracing::warn!("Response without a usable id");
            let detail = raw
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("no usable id")
                .to_string();
            fail_pending(pending, || {
                McpError::InvalidResponse(format!("unmatched response from server: {}", detail))
            });
            return;
        }
    };

    let sender = lock_pending(pending).remove(&id);
    match sender {
        Some(tx) => {
            let outcome = serde_json::from_value::<JsonRpcResponse>(raw).map_err(McpError::from);
            let _ = tx.send(outcome);
        }
        None => tracing::warn!(id = %id, "Response for unknown or abandoned request"),
    }
}

fn fail_pending(pending: &Mutex<HashMap<RpcId, ResponseSender>>, error: impl Fn() -> McpError) {
    let waiting: Vec<_> = lock_pending(pending).drain().collect();
    for (_, tx) in waiting {
        let _ = tx.send(Err(error()));
    }
}

#[async_trait]
impl ToolProvider for McpClient {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BridgeError> {
        let tools = self.tools_list().await?;
        Ok(tools.into_iter().map(ToolDescriptor::from).collect())
    }

    async fn call_tool(&self, invocation: ToolInvocation) -> Result<ToolResult, BridgeError> {
        let name = invocation.tool_name;
        match self.tools_call(&name, Value::Object(invocation.arguments)).await {
            Ok(result) if result.is_error => Err(BridgeError::ToolExecution {
                tool: name,
                message: result.error_message(),
            }),
            Ok(result) => Ok(ToolResult::new(result.into_value())),
            Err(e) if e.is_tool_not_found() => Err(BridgeError::UnknownTool(name)),
            Err(McpError::Rpc { message, .. }) => Err(BridgeError::ToolExecution {
                tool: name,
                message,
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn session(&self) -> SessionToken {
        self.session.clone()
    }

    fn provider_name(&self) -> &str {
        "mcp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::McpServer;
    use crate::transport::ChannelTransport;
    use serde_json::json;
    use toolbridge_runtime::demo_catalog;

    async fn connected_pair() -> (McpClient, JoinHandle<Result<(), McpError>>) {
        let (client_side, mut server_side) = ChannelTransport::pair();
        let mut server = McpServer::new(Arc::new(demo_catalog().unwrap()));
        let handle = tokio::spawn(async move { server.run(&mut server_side).await });
        let client = McpClient::connect(client_side).await.unwrap();
        (client, handle)
    }

    #[tokio::test]
    async fn test_handshake_records_server_info() {
        let (client, _server) = connected_pair().await;
        let info = client.server_info().unwrap();
        assert_eq!(info.server_info.name, "toolbridge-provider");
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_tools_list_and_call() {
        let (client, _server) = connected_pair().await;
        let tools = client.tools_list().await.unwrap();
        assert_eq!(tools.len(), 3);

        let result = client
            .tools_call("add", json!({"a": 123, "b": 456}))
            .await
            .unwrap();
        assert_eq!(result.into_value(), json!(579));
    }

    #[tokio::test]
    async fn test_unknown_remote_tool_maps_to_unknown_tool() {
        let (client, _server) = connected_pair().await;
        let err = ToolProvider::call_tool(&client, ToolInvocation::new("missing", Default::default()))
            .await
            .unwrap_err();
        assert_eq!(err, BridgeError::UnknownTool("missing".into()));
    }

    #[tokio::test]
    async fn test_shutdown_closes_session() {
        let (client, server) = connected_pair().await;
        client.shutdown().await.unwrap();
        assert!(!client.is_connected());

        let err = client.tools_list().await.unwrap_err();
        assert!(matches!(err, McpError::Closed));

        // Closing the sink ends the server loop.
        server.await.unwrap().unwrap();
        client.shutdown().await.unwrap();
    }

    /// Connect to a hand-driven server and answer the handshake.
    async fn fake_session(request_timeout: Duration) -> (Arc<McpClient>, ChannelTransport) {
        let (client_side, mut fake_server) = ChannelTransport::pair();
        let connect = tokio::spawn(McpClient::connect_with_timeout(client_side, request_timeout));

        let init: JsonRpcRequest = serde_json::from_str(&fake_server.receive().await.unwrap().unwrap()).unwrap();
        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: json!({}),
            server_info: PeerInfo::new("fake", None),
        };
        reply(&mut fake_server, init.id, serde_json::to_value(result).unwrap()).await;
        let client = Arc::new(connect.await.unwrap().unwrap());
        let _initialized = fake_server.receive().await.unwrap().unwrap();
        (client, fake_server)
    }

    async fn next_request(fake_server: &mut ChannelTransport) -> JsonRpcRequest {
        serde_json::from_str(&fake_server.receive().await.unwrap().unwrap()).unwrap()
    }

    async fn reply(fake_server: &mut ChannelTransport, id: RpcId, result: Value) {
        let line = serde_json::to_string(&JsonRpcResponse::success(id, result)).unwrap();
        fake_server.send(&line).await.unwrap();
    }

    fn tool_page(names: &[&str], next_cursor: Option<&str>) -> Value {
        json!({
            "tools": names.iter().map(|n| json!({"name": n})).collect::<Vec<_>>(),
            "nextCursor": next_cursor,
        })
    }

    #[tokio::test]
    async fn test_server_disconnect_fails_pending_and_closes_session() {
        let (client, mut fake_server) = fake_session(DEFAULT_REQUEST_TIMEOUT).await;

        let caller = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.tools_list().await })
        };
        let _list = next_request(&mut fake_server).await;
        drop(fake_server);

        let err = caller.await.unwrap().unwrap_err();
        assert!(matches!(err, McpError::Closed));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_unparseable_line_fails_pending_requests() {
        let (client, mut fake_server) = fake_session(Duration::from_secs(30)).await;

        let caller = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.tools_list().await })
        };
        let _list = next_request(&mut fake_server).await;
        let started = std::time::Instant::now();
        fake_server.send("this is not json").await.unwrap();

        let err = caller.await.unwrap().unwrap_err();
        assert!(matches!(err, McpError::InvalidResponse(_)), "{:?}", err);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(BridgeError::from(err), BridgeError::Protocol(_)));

        // The session itself survives.
        assert!(client.is_connected());
        let caller = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.tools_list().await })
        };
        let list = next_request(&mut fake_server).await;
        reply(&mut fake_server, list.id, tool_page(&["echo"], None)).await;
        assert_eq!(caller.await.unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_idless_error_fails_pending_requests() {
        let (client, mut fake_server) = fake_session(DEFAULT_REQUEST_TIMEOUT).await;

        let caller = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.tools_call("echo", json!({})).await })
        };
        let _call = next_request(&mut fake_server).await;
        fake_server
            .send(r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"Parse error"}}"#)
            .await
            .unwrap();

        match caller.await.unwrap().unwrap_err() {
            McpError::InvalidResponse(msg) => assert!(msg.contains("Parse error")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_tools_list_follows_cursors() {
        let (client, mut fake_server) = fake_session(DEFAULT_REQUEST_TIMEOUT).await;
        let caller = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.tools_list().await })
        };

        let first = next_request(&mut fake_server).await;
        assert!(first.params.as_ref().unwrap().get("cursor").is_none());
        reply(&mut fake_server, first.id, tool_page(&["add", "echo"], Some("page-2"))).await;

        let second = next_request(&mut fake_server).await;
        assert_eq!(second.params.as_ref().unwrap()["cursor"], json!("page-2"));
        reply(&mut fake_server, second.id, tool_page(&["reverse"], None)).await;

        let names: Vec<_> = caller.await.unwrap().unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["add", "echo", "reverse"]);
    }

    #[tokio::test]
    async fn test_repeated_cursor_is_rejected() {
        let (client, mut fake_server) = fake_session(DEFAULT_REQUEST_TIMEOUT).await;
        let caller = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.tools_list().await })
        };

        let first = next_request(&mut fake_server).await;
        reply(&mut fake_server, first.id, tool_page(&["a"], Some("again"))).await;
        let second = next_request(&mut fake_server).await;
        reply(&mut fake_server, second.id, tool_page(&["b"], Some("again"))).await;

        let err = caller.await.unwrap().unwrap_err();
        assert!(matches!(err, McpError::InvalidResponse(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_image_result_passes_through() {
        let (client, mut fake_server) = fake_session(DEFAULT_REQUEST_TIMEOUT).await;
        let caller = {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                ToolProvider::call_tool(&*client, ToolInvocation::new("snapshot", Default::default())).await
            })
        };

        let call = next_request(&mut fake_server).await;
        let block = json!({"type": "image", "data": "iVBORw0K", "mimeType": "image/png"});
        reply(&mut fake_server, call.id, json!({"content": [block.clone()]})).await;

        let result = caller.await.unwrap().unwrap();
        assert_eq!(result.value, json!([block]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout() {
        let (client_side, mut fake_server) = ChannelTransport::pair();
        let connect = tokio::spawn(McpClient::connect_with_timeout(client_side, Duration::from_secs(5)));

        let _init = fake_server.receive().await.unwrap().unwrap();
        // Never answer.
        let err = connect.await.unwrap().err().unwrap();
        assert!(matches!(err, McpError::Timeout(_)));
    }
}
