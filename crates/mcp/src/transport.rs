//! MCP transport layer.
//!
//! A transport moves newline-delimited JSON-RPC messages. It is split into a
//! [`MessageSource`] and a [`MessageSink`] so a client can read responses on a
//! background task while requests are written from any caller.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::error::McpError;

/// Receiving half of a transport.
#[async_trait]
pub trait MessageSource: Send {
    /// Read the next JSON-RPC message line from the transport.
    /// Returns `None` when the transport is closed.
    async fn receive(&mut self) -> Result<Option<String>, McpError>;
}

/// Sending half of a transport.
#[async_trait]
pub trait MessageSink: Send {
    /// Write a JSON-RPC message line to the transport.
    async fn send(&mut self, message: &str) -> Result<(), McpError>;

    /// Signal end of output to the peer.
    async fn close(&mut self) -> Result<(), McpError> {
        Ok(())
    }
}

/// A full-duplex MCP transport.
pub trait McpTransport: MessageSource + MessageSink {
    /// Separate the two directions so they can be driven independently.
    fn split(self: Box<Self>) -> (Box<dyn MessageSource>, Box<dyn MessageSink>);
}

// ── Line-delimited byte streams ─────────────────────────────────────

/// Reads one JSON message per line, skipping blank lines.
pub struct LineReader<R> {
    inner: BufReader<R>,
}

impl<R: AsyncRead + Unpin + Send> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> MessageSource for LineReader<R> {
    async fn receive(&mut self) -> Result<Option<String>, McpError> {
        loop {
            let mut line = String::new();
            let bytes_read = self.inner.read_line(&mut line).await?;
            if bytes_read == 0 {
                return Ok(None); // EOF
            }
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok(Some(trimmed.to_string()));
            }
        }
    }
}

/// Writes one JSON message per line and flushes after each.
pub struct LineWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin + Send> LineWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { inner: writer }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> MessageSink for LineWriter<W> {
    async fn send(&mut self, message: &str) -> Result<(), McpError> {
        self.inner.write_all(message.as_bytes()).await?;
        self.inner.write_all(b"\n").await?;
        self.inner.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), McpError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

/// Newline-delimited JSON over any async reader/writer pair.
///
/// Used for stdio, child process pipes and in-memory duplex streams.
pub struct LineTransport<R, W> {
    reader: LineReader<R>,
    writer: LineWriter<W>,
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: LineReader::new(reader),
            writer: LineWriter::new(writer),
        }
    }
}

#[async_trait]
impl<R, W> MessageSource for LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn receive(&mut self) -> Result<Option<String>, McpError> {
        self.reader.receive().await
    }
}

#[async_trait]
impl<R, W> MessageSink for LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, message: &str) -> Result<(), McpError> {
        self.writer.send(message).await
    }

    async fn close(&mut self) -> Result<(), McpError> {
        self.writer.close().await
    }
}

impl<R, W> McpTransport for LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn split(self: Box<Self>) -> (Box<dyn MessageSource>, Box<dyn MessageSink>) {
        let LineTransport { reader, writer } = *self;
        (Box::new(reader), Box::new(writer))
    }
}

/// Stdio-based transport: reads stdin, writes stdout.
pub type StdioTransport = LineTransport<tokio::io::Stdin, tokio::io::Stdout>;

/// Create a transport over the process's own stdin and stdout.
pub fn stdio() -> StdioTransport {
    LineTransport::new(tokio::io::stdin(), tokio::io::stdout())
}

// ── In-memory channels ──────────────────────────────────────────────

/// In-memory transport for testing, backed by channel pairs.
pub struct ChannelTransport {
    source: ChannelSource,
    sink: ChannelSink,
}

impl ChannelTransport {
    /// Create a pair of connected transports for testing.
    ///
    /// Messages sent on one transport are received by the other.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_b) = mpsc::channel(32);
        let (tx_b, rx_a) = mpsc::channel(32);
        (
            Self {
                source: ChannelSource { rx: rx_a },
                sink: ChannelSink { tx: Some(tx_a) },
            },
            Self {
                source: ChannelSource { rx: rx_b },
                sink: ChannelSink { tx: Some(tx_b) },
            },
        )
    }
}

pub struct ChannelSource {
    rx: mpsc::Receiver<String>,
}

pub struct ChannelSink {
    tx: Option<mpsc::Sender<String>>,
}

#[async_trait]
impl MessageSource for ChannelSource {
    async fn receive(&mut self) -> Result<Option<String>, McpError> {
        Ok(self.rx.recv().await)
    }
}

#[async_trait]
impl MessageSink for ChannelSink {
    async fn send(&mut self, message: &str) -> Result<(), McpError> {
        let tx = self.tx.as_ref().ok_or(McpError::Closed)?;
        tx.send(message.to_string()).await.map_err(|e| {
            McpError::Transport(std::io::Error::new(std::io::ErrorKind::BrokenPipe, e))
        })
    }

    async fn close(&mut self) -> Result<(), McpError> {
        self.tx = None;
        Ok(())
    }
}

#[async_trait]
impl MessageSource for ChannelTransport {
    async fn receive(&mut self) -> Result<Option<String>, McpError> {
        self.source.receive().await
    }
}

#[async_trait]
impl MessageSink for ChannelTransport {
    async fn send(&mut self, message: &str) -> Result<(), McpError> {
        self.sink.send(message).await
    }

    async fn close(&mut self) -> Result<(), McpError> {
        self.sink.close().await
    }
}

impl McpTransport for ChannelTransport {
    fn split(self: Box<Self>) -> (Box<dyn MessageSource>, Box<dyn MessageSink>) {
        (Box::new(self.source), Box::new(self.sink))
    }
}
