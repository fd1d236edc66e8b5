//! Integration tests for the REST provider over a real TCP socket.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use toolbridge_mcp::{serve_with_shutdown, HttpToolProvider};
use toolbridge_runtime::{demo_catalog, BridgeError, ToolBridge, ToolInvocation, ToolProvider};

const TIMEOUT: Duration = Duration::from_secs(5);

struct TestServer {
    url: String,
    stop: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(serve_with_shutdown(
            listener,
            Arc::new(demo_catalog().unwrap()),
            async move {
                let _ = stopped.await;
            },
        ));
        Self {
            url: format!("http://{}", addr),
            stop: Some(stop),
            handle,
        }
    }

    async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.handle.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn reverse_and_add_over_rest() {
    let server = TestServer::start().await;
    let provider = Arc::new(HttpToolProvider::connect(&server.url, TIMEOUT).await.unwrap());

    let registry = ToolBridge::new(provider.clone())
        .with_plugin_name("RestPlugin")
        .integrate_tools()
        .await
        .unwrap();
    assert_eq!(registry.len(), 3);
    assert_eq!(registry.qualified_name("add").as_deref(), Some("RestPlugin-add"));

    let reversed = registry
        .invoke("reverse", json!({"input": "Python is fun!"}))
        .await
        .unwrap();
    assert_eq!(reversed.value, json!("!nuf si nohtyP"));

    let sum = registry.invoke("add", json!({"a": 123, "b": 456})).await.unwrap();
    assert_eq!(sum.value, json!(579));

    provider.close();
    let err = registry.invoke("add", json!({"a": 1, "b": 2})).await.unwrap_err();
    assert!(matches!(err, BridgeError::StaleRegistry(_)));

    server.stop().await;
}

#[tokio::test]
async fn provider_errors_map_to_bridge_errors() {
    let server = TestServer::start().await;
    let provider = HttpToolProvider::connect(&server.url, TIMEOUT).await.unwrap();

    let err = provider
        .call_tool(ToolInvocation::new("missing", Default::default()))
        .await
        .unwrap_err();
    assert_eq!(err, BridgeError::UnknownTool("missing".into()));

    // Bypass the stub so the server sees the bad input.
    let mut args = serde_json::Map::new();
    args.insert("a".into(), json!("one"));
    args.insert("b".into(), json!(2));
    let err = provider
        .call_tool(ToolInvocation::new("add", args))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::ArgumentMismatch { .. }));

    server.stop().await;
}

#[tokio::test]
async fn raw_execute_endpoint() {
    let server = TestServer::start().await;
    let http = reqwest::Client::new();

    let resp = http
        .post(format!("{}/execute", server.url))
        .json(&json!({"tool": "reverse", "input": "abc"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"result": "cba"}));

    let resp = http
        .post(format!("{}/execute", server.url))
        .json(&json!({"tool": "nope", "arguments": {}}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"error": "Tool not found"}));

    server.stop().await;
}

#[tokio::test]
async fn connect_fails_when_nothing_listens() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = HttpToolProvider::connect(&format!("http://{}", addr), TIMEOUT)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, BridgeError::Connection(_)));
}

#[tokio::test]
async fn undecodable_tool_list_is_protocol_error() {
    use axum::routing::get;

    let app = axum::Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/tools", get(|| async { "<html>not a tool list</html>" }));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    let provider = Arc::new(HttpToolProvider::connect(&format!("http://{}", addr), TIMEOUT).await.unwrap());
    let err = ToolBridge::new(provider.clone()).integrate_tools().await.unwrap_err();
    assert!(matches!(err, BridgeError::Protocol(_)), "{:?}", err);
    assert!(provider.session().is_open());

    server.abort();
}
