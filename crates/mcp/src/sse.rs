//! MCP over HTTP with Server-Sent Events.
//!
//! The client opens `GET /sse` and keeps the stream. The first event,
//! `endpoint`, names the URL that accepts the client's JSON-RPC messages as
//! `POST` bodies. Every message from the server then arrives as a `message`
//! event on the stream.
//!
//! [`sse_router`] serves a `ToolCatalog` this way, running one [`McpServer`]
//! per stream. [`SseTransport`] is the client half and plugs into
//! [`McpClient`](crate::client::McpClient) like any other transport.

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;

use toolbridge_runtime::ToolCatalog;

use crate::error::McpError;
use crate::http::error_reply;
use crate::server::McpServer;
use crate::transport::{ChannelTransport, McpTransport, MessageSink, MessageSource};

/// Path of the event stream, relative to the provider's base URL.
pub const SSE_PATH: &str = "/sse";

/// Path that accepts posted client messages.
pub const MESSAGES_PATH: &str = "/messages";

/// The event stream URL for a provider base URL.
///
/// A URL that already ends in `/sse` is returned unchanged.
pub fn sse_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with(SSE_PATH) {
        base.to_string()
    } else {
        format!("{}{}", base, SSE_PATH)
    }
}

// ── Event parsing ───────────────────────────────────────────────────

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

impl SseEvent {
    /// Parse one event block (the text between blank lines).
    ///
    /// Returns `None` for blocks without data, such as keep-alive comments.
    pub fn parse(block: &str) -> Option<Self> {
        let mut event = None;
        let mut data: Vec<&str> = Vec::new();
        for line in block.lines() {
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => event = Some(value.to_string()),
                "data" => data.push(value),
                _ => {}
            }
        }
        if data.is_empty() {
            return None;
        }
        Some(Self {
            event: event.unwrap_or_else(|| "message".to_string()),
            data: data.join("\n"),
        })
    }
}

/// Splits a byte stream into server-sent events.
struct EventReader {
    chunks: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    buffer: Vec<u8>,
}

impl EventReader {
    fn new(response: reqwest::Response) -> Self {
        Self {
            chunks: response.bytes_stream().map(|chunk| chunk.map(|b| b.to_vec())).boxed(),
            buffer: Vec::new(),
        }
    }

    /// Next event with data, or `None` once the stream ends.
    async fn next_event(&mut self) -> Result<Option<SseEvent>, McpError> {
        loop {
            while let Some(end) = self.buffer.windows(2).position(|w| w == b"\n\n") {
                let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
                if let Some(event) = SseEvent::parse(&String::from_utf8_lossy(&block)) {
                    return Ok(Some(event));
                }
            }
            match self.chunks.next().await {
                Some(Ok(chunk)) => self.buffer.extend(chunk.into_iter().filter(|b| *b != b'\r')),
                Some(Err(e)) => {
                    return Err(McpError::Transport(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        e,
                    )))
                }
                None => return Ok(None),
            }
        }
    }
}

// ── Client transport ────────────────────────────────────────────────

/// Client side of the SSE transport.
pub struct SseTransport {
    source: SseSource,
    sink: PostSink,
}

impl SseTransport {
    /// Open the event stream at `url` and wait for the `endpoint` event.
    ///
    /// `timeout` bounds connecting, the wait for the endpoint and each post.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, McpError> {
        let stream_url = reqwest::Url::parse(url)
            .map_err(|e| McpError::ServerUnavailable(format!("invalid SSE url '{}': {}", url, e)))?;
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| McpError::ServerUnavailable(format!("failed to build HTTP client: {}", e)))?;

        let response = http
            .get(stream_url.clone())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| McpError::ServerUnavailable(format!("{}: {}", stream_url, e)))?;
        if !response.status().is_success() {
            return Err(McpError::ServerUnavailable(format!(
                "{} returned {}",
                stream_url,
                response.status()
            )));
        }

        let mut events = EventReader::new(response);
        let endpoint = match tokio::time::timeout(timeout, events.next_event()).await {
            Ok(Ok(Some(event))) if event.event == "endpoint" => event.data,
            Ok(Ok(Some(event))) => {
                return Err(McpError::InvalidResponse(format!(
                    "expected an endpoint event, got '{}'",
                    event.event
                )))
            }
            Ok(Ok(None)) => {
                return Err(McpError::ServerUnavailable(
                    "event stream ended before the endpoint event".to_string(),
                ))
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(McpError::Timeout(timeout)),
        };
        let endpoint = stream_url
            .join(endpoint.trim())
            .map_err(|e| McpError::InvalidResponse(format!("invalid endpoint '{}': {}", endpoint, e)))?;

        tracing::info!(stream = %stream_url, endpoint = %endpoint, "SSE transport connected");
        Ok(Self {
            source: SseSource { events },
            sink: PostSink {
                http,
                endpoint,
                timeout,
                closed: false,
            },
        })
    }

    /// URL the client posts its messages to.
    pub fn endpoint(&self) -> &str {
        self.sink.endpoint.as_str()
    }
}

/// Yields the data of each `message` event.
pub struct SseSource {
    events: EventReader,
}

#[async_trait]
impl MessageSource for SseSource {
    async fn receive(&mut self) -> Result<Option<String>, McpError> {
        loop {
            match self.events.next_event().await? {
                Some(event) if event.event == "message" => return Ok(Some(event.data)),
                Some(event) => tracing::debug!(event = %event.event, "Ignoring SSE event"),
                None => return Ok(None),
            }
        }
    }
}

/// Posts each message to the session endpoint.
pub struct PostSink {
    http: reqwest::Client,
    endpoint: reqwest::Url,
    timeout: Duration,
    closed: bool,
}

#[async_trait]
impl MessageSink for PostSink {
    async fn send(&mut self, message: &str) -> Result<(), McpError> {
        if self.closed {
            return Err(McpError::Closed);
        }
        let response = self
            .http
            .post(self.endpoint.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(message.to_string())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| McpError::ServerUnavailable(format!("POST {}: {}", self.endpoint, e)))?;
        if !response.status().is_success() {
            return Err(McpError::ServerUnavailable(format!(
                "POST {} returned {}",
                self.endpoint,
                response.status()
            )));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), McpError> {
        self.closed = true;
        Ok(())
    }
}

#[async_trait]
impl MessageSource for SseTransport {
    async fn receive(&mut self) -> Result<Option<String>, McpError> {
        self.source.receive().await
    }
}

#[async_trait]
impl MessageSink for SseTransport {
    async fn send(&mut self, message: &str) -> Result<(), McpError> {
        self.sink.send(message).await
    }

    async fn close(&mut self) -> Result<(), McpError> {
        self.sink.close().await
    }
}

impl McpTransport for SseTransport {
    fn split(self: Box<Self>) -> (Box<dyn MessageSource>, Box<dyn MessageSink>) {
        (Box::new(self.source), Box::new(self.sink))
    }
}

// ── Server ──────────────────────────────────────────────────────────

type Inbox = Arc<tokio::sync::Mutex<Box<dyn MessageSink>>>;

#[derive(Clone)]
struct SseState {
    catalog: Arc<ToolCatalog>,
    sessions: Arc<Mutex<HashMap<String, Inbox>>>,
    next_session: Arc<AtomicU64>,
    /// Flips once the server starts shutting down; open streams end then.
    closing: watch::Receiver<bool>,
}

impl SseState {
    fn inbox(&self, session_id: &str) -> Option<Inbox> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
    }

    async fn end_session(&self, session_id: &str) {
        let inbox = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
        if let Some(inbox) = inbox {
            // Ends that session's server loop.
            let _ = inbox.lock().await.close().await;
        }
        tracing::info!(session = %session_id, "SSE session ended");
    }
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    session_id: String,
}

/// Build the MCP-over-SSE router serving `catalog`.
///
/// Event streams stay open until the client goes away. Use
/// [`serve_sse_with_shutdown`] to also end them when the server stops.
pub fn sse_router(catalog: Arc<ToolCatalog>) -> Router {
    let (_, closing) = watch::channel(false);
    router_with_closing(catalog, closing)
}

fn router_with_closing(catalog: Arc<ToolCatalog>, closing: watch::Receiver<bool>) -> Router {
    let state = SseState {
        catalog,
        sessions: Arc::new(Mutex::new(HashMap::new())),
        next_session: Arc::new(AtomicU64::new(1)),
        closing,
    };
    Router::new()
        .route(SSE_PATH, get(open_stream))
        .route(MESSAGES_PATH, post(post_message))
        .with_state(state)
}

async fn open_stream(
    State(state): State<SseState>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let session_id = format!("{:016x}", state.next_session.fetch_add(1, Ordering::Relaxed));
    let (client_half, mut server_half) = ChannelTransport::pair();
    let (mut outbound, inbound) = Box::new(client_half).split();
    state
        .sessions
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(session_id.clone(), Arc::new(tokio::sync::Mutex::new(inbound)));

    let mut server = McpServer::new(Arc::clone(&state.catalog));
    tokio::spawn(async move {
        if let Err(e) = server.run(&mut server_half).await {
            tracing::warn!(error = %e, "SSE session server failed");
        }
    });

    let mut closing = state.closing.clone();
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(32);
    let endpoint = format!("{}?session_id={}", MESSAGES_PATH, session_id);
    tracing::info!(session = %session_id, "SSE session opened");

    tokio::spawn(async move {
        if tx.send(Ok(Event::default().event("endpoint").data(endpoint))).await.is_ok() {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    Ok(()) = closing.changed() => break,
                    message = outbound.receive() => match message {
                        Ok(Some(line)) => {
                            let event = Event::default().event("message").data(line);
                            if tx.send(Ok(event)).await.is_err() {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            tracing::warn!(error = %e, "SSE session read failed");
                            break;
                        }
                    },
                }
            }
        }
        state.end_session(&session_id).await;
    });

    Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default())
}

async fn post_message(
    State(state): State<SseState>,
    Query(query): Query<MessageQuery>,
    body: String,
) -> Response {
    let Some(inbox) = state.inbox(&query.session_id) else {
        tracing::debug!(session = %query.session_id, "Message for unknown session");
        return error_reply(StatusCode::NOT_FOUND, "Session not found");
    };
    let reply = match inbox.lock().await.send(&body).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => error_reply(StatusCode::GONE, e.to_string()),
    };
    reply
}

/// Serve the SSE router until `shutdown` resolves, then end every open
/// event stream so in-flight responses can finish.
pub async fn serve_sse_with_shutdown<F>(
    listener: TcpListener,
    catalog: Arc<ToolCatalog>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (closing_tx, closing) = watch::channel(false);
    axum::serve(listener, router_with_closing(catalog, closing))
        .with_graceful_shutdown(async move {
            shutdown.await;
            let _ = closing_tx.send(true);
        })
        .await
}
