//! Plain REST provider: `GET /tools` and `POST /execute`.
//!
//! The server side is an axum router over a `ToolCatalog`; the client side is
//! [`HttpToolProvider`], a reqwest-backed `ToolProvider`.

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use toolbridge_runtime::{
    BridgeError, SessionToken, ToolCatalog, ToolDescriptor, ToolError, ToolInvocation,
    ToolProvider, ToolResult,
};

/// Body of `GET /tools`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsResponse {
    pub tools: Vec<ToolDescriptor>,
}

/// Body of `POST /execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub tool: String,
    #[serde(default)]
    pub arguments: Value,
    /// Single-string shorthand for text tools, equivalent to
    /// `"arguments": {"input": ...}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
}

impl ExecuteRequest {
    fn into_arguments(self) -> Value {
        match (self.arguments, self.input) {
            (Value::Null, Some(input)) => serde_json::json!({ "input": input }),
            (Value::Null, None) => Value::Object(Default::default()),
            (arguments, _) => arguments,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub result: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub(crate) fn error_reply(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

// ── Server ──────────────────────────────────────────────────────────

/// Build the provider router serving `catalog`.
pub fn provider_router(catalog: Arc<ToolCatalog>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tools", get(list_tools))
        .route("/execute", post(execute))
        .with_state(catalog)
}

async fn health() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn list_tools(State(catalog): State<Arc<ToolCatalog>>) -> Json<ToolsResponse> {
    Json(ToolsResponse {
        tools: catalog.list(),
    })
}

async fn execute(
    State(catalog): State<Arc<ToolCatalog>>,
    Json(req): Json<ExecuteRequest>,
) -> Response {
    let Some(tool) = catalog.get(&req.tool) else {
        tracing::debug!(tool = %req.tool, "Execute for unknown tool");
        return error_reply(StatusCode::NOT_FOUND, "Tool not found");
    };
    let name = req.tool.clone();

    match tool.execute(req.into_arguments()).await {
        Ok(result) => (StatusCode::OK, Json(ExecuteResponse { result })).into_response(),
        Err(ToolError::InvalidInput(msg)) => error_reply(StatusCode::BAD_REQUEST, msg),
        Err(e) => {
            tracing::warn!(tool = %name, error = %e, "Tool execution failed");
            error_reply(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Serve the provider router until the listener fails.
pub async fn serve(listener: TcpListener, catalog: Arc<ToolCatalog>) -> std::io::Result<()> {
    axum::serve(listener, provider_router(catalog)).await
}

/// Serve the provider router until `shutdown` resolves.
pub async fn serve_with_shutdown<F>(
    listener: TcpListener,
    catalog: Arc<ToolCatalog>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, provider_router(catalog))
        .with_graceful_shutdown(shutdown)
        .await
}

// ── Client ──────────────────────────────────────────────────────────

/// `ToolProvider` talking to a REST provider.
///
/// HTTP carries no session, so the token only closes through [`close`](Self::close).
pub struct HttpToolProvider {
    base_url: String,
    http: reqwest::Client,
    session: SessionToken,
}

impl HttpToolProvider {
    /// Create a provider without probing the server.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BridgeError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BridgeError::Connection(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            session: SessionToken::open(),
        })
    }

    /// Create a provider and check that the server answers `/health`.
    pub async fn connect(base_url: &str, timeout: Duration) -> Result<Self, BridgeError> {
        let provider = Self::new(base_url, timeout)?;
        provider.health_check().await?;
        tracing::info!(url = %provider.base_url, "Connected to REST tool provider");
        Ok(provider)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if the server is reachable.
    pub async fn health_check(&self) -> Result<(), BridgeError> {
        let url = format!("{}/health", self.base_url);
        let resp = self.http.get(&url).send().await.map_err(|e| connection_error(&url, e))?;
        if !resp.status().is_success() {
            return Err(BridgeError::Connection(format!(
                "{} returned {}",
                url,
                resp.status()
            )));
        }
        Ok(())
    }

    /// End the session. Stubs built from this provider become stale.
    pub fn close(&self) {
        if self.session.close() {
            tracing::info!(url = %self.base_url, "REST provider session closed");
        }
    }

    fn ensure_open(&self) -> Result<(), BridgeError> {
        if self.session.is_open() {
            Ok(())
        } else {
            Err(BridgeError::Connection(format!(
                "session with {} is closed",
                self.base_url
            )))
        }
    }
}

fn connection_error(url: &str, e: reqwest::Error) -> BridgeError {
    BridgeError::Connection(format!("{}: {}", url, e))
}

/// Pull the `error` field out of a failure body, falling back to raw text.
async fn error_message(resp: reqwest::Response) -> String {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(err) => err.error,
        Err(_) if body.is_empty() => status.to_string(),
        Err(_) => body,
    }
}

#[async_trait]
impl ToolProvider for HttpToolProvider {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BridgeError> {
        self.ensure_open()?;
        let url = format!("{}/tools", self.base_url);
        let resp = self.http.get(&url).send().await.map_err(|e| connection_error(&url, e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let message = error_message(resp).await;
            return Err(BridgeError::Protocol(format!(
                "GET /tools returned {}: {}",
                status, message
            )));
        }

        let body: ToolsResponse = resp
            .json()
            .await
            .map_err(|e| BridgeError::Protocol(format!("invalid /tools body: {}", e)))?;
        tracing::debug!(count = body.tools.len(), "Listed REST tools");
        Ok(body.tools)
    }

    async fn call_tool(&self, invocation: ToolInvocation) -> Result<ToolResult, BridgeError> {
        self.ensure_open()?;
        let url = format!("{}/execute", self.base_url);
        let name = invocation.tool_name;
        let body = ExecuteRequest {
            tool: name.clone(),
            arguments: Value::Object(invocation.arguments),
            input: None,
        };

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| connection_error(&url, e))?;

        match resp.status() {
            status if status.is_success() => {
                let body: ExecuteResponse = resp
                    .json()
                    .await
                    .map_err(|e| BridgeError::Protocol(format!("invalid /execute body: {}", e)))?;
                Ok(ToolResult::new(body.result))
            }
            StatusCode::NOT_FOUND => Err(BridgeError::UnknownTool(name)),
            StatusCode::BAD_REQUEST => Err(BridgeError::ArgumentMismatch {
                tool: name,
                reason: error_message(resp).await,
            }),
            _ => Err(BridgeError::ToolExecution {
                tool: name,
                message: error_message(resp).await,
            }),
        }
    }

    fn session(&self) -> SessionToken {
        self.session.clone()
    }

    fn provider_name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_execute_request_arguments() {
        let req: ExecuteRequest =
            serde_json::from_value(json!({"tool": "reverse", "input": "abc"})).unwrap();
        assert_eq!(req.into_arguments(), json!({"input": "abc"}));

        let req: ExecuteRequest =
            serde_json::from_value(json!({"tool": "add", "arguments": {"a": 1, "b": 2}})).unwrap();
        assert_eq!(req.into_arguments(), json!({"a": 1, "b": 2}));

        let req: ExecuteRequest = serde_json::from_value(json!({"tool": "echo"})).unwrap();
        assert_eq!(req.into_arguments(), json!({}));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let provider = HttpToolProvider::new("http://localhost:8080/", Duration::from_secs(1)).unwrap();
        assert_eq!(provider.base_url(), "http://localhost:8080");
        assert!(provider.session().is_open());
    }

    #[tokio::test]
    async fn test_closed_provider_refuses_calls() {
        let provider = HttpToolProvider::new("http://localhost:1", Duration::from_secs(1)).unwrap();
        provider.close();
        let err = provider.list_tools().await.unwrap_err();
        assert!(matches!(err, BridgeError::Connection(_)));
    }
}
