//! Connection Handler Module
//!
//! Each client gets its own task that reads lines, runs them through the
//! command registry and writes the responses back, until the client goes
//! away.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects, handler task spawned
//!        │
//!        ▼
//! 2. ┌──────────────────────────────┐
//!    │  Main Loop                   │
//!    │                              │
//!    │   read bytes into buffer     │
//!    │            │                 │
//!    │            ▼                 │
//!    │   split off complete lines   │
//!    │            │                 │
//!    │            ▼                 │
//!    │   execute, send response     │
//!    │   (SAVE and DEBUG RELOAD run │
//!    │    on the blocking pool)     │
//!    │            │                 │
//!    │       [loop back]            │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 3. EOF: run the unterminated tail, if any, then end the task
//! ```
//!
//! ## Buffer Management
//!
//! Incoming bytes accumulate in a `BytesMut`. A read may end mid-line or
//! carry several lines, so the loop drains every complete line before
//! reading again.

use crate::commands::CommandRegistry;
use crate::protocol::{ErrorKind, LineParser, ParseError, RespValue, MAX_LINE_SIZE};
use bytes::BytesMut;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, error, info, trace, warn};

/// Hard cap on buffered, unparsed input (one maximal line plus CRLF)
const MAX_BUFFER_SIZE: usize = MAX_LINE_SIZE + 2;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Handles a single client connection.
///
/// Generic over the byte stream so the loop runs the same over a
/// `TcpStream` or an in-memory mock.
pub struct ConnectionHandler<S> {
    /// The client stream
    stream: BufWriter<S>,

    /// Peer label (for logging)
    peer: String,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// The verb table (shared across connections)
    registry: Arc<CommandRegistry>,

    /// Line framing state
    parser: LineParser,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection handler and counts the connection as open.
    pub fn new(
        stream: S,
        peer: impl Into<String>,
        registry: Arc<CommandRegistry>,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            peer: peer.into(),
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            registry,
            parser: LineParser::new(),
            stats,
        }
    }

    /// Runs the connection until the client disconnects or an error occurs.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.peer, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.peer, "Client disconnected gracefully"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    info!(client = %self.peer, "Client disconnected")
                }
                ConnectionError::IoError(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.peer, "Connection reset by client")
                }
                _ => warn!(client = %self.peer, error = %e, "Connection error"),
            },
        }

        self.stats.connection_closed();
        result
    }

    /// The main read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            loop {
                match self.parser.parse(&mut self.buffer) {
                    Ok(Some(line)) => self.execute_line(&line).await?,
                    Ok(None) => break,
                    Err(e) => self.reject_line(e).await?,
                }
            }

            if !self.read_more_data().await? {
                // Peer closed its side; a last line may lack its newline
                match self.parser.finish(&mut self.buffer) {
                    Ok(Some(line)) => self.execute_line(&line).await?,
                    Ok(None) => {}
                    Err(e) => self.reject_line(e).await?,
                }
                return Err(ConnectionError::ClientDisconnected);
            }
        }
    }

    /// Runs one command line and sends its response. Blank lines are skipped.
    async fn execute_line(&mut self, line: &str) -> Result<(), ConnectionError> {
        if line.trim().is_empty() {
            trace!(client = %self.peer, "Skipping blank line");
            return Ok(());
        }

        trace!(client = %self.peer, line = %line, "Executing command");
        let response = self.registry.execute_async(line).await;
        self.stats.command_processed();
        self.send_response(&response).await
    }

    /// Answers a line that could not be decoded, or gives up on the stream.
    async fn reject_line(&mut self, err: ParseError) -> Result<(), ConnectionError> {
        match err {
            ParseError::InvalidUtf8(detail) => {
                warn!(client = %self.peer, error = %detail, "Rejected non-UTF-8 line");
                let response =
                    RespValue::error(ErrorKind::IllegalArgument, "command line is not valid UTF-8");
                self.send_response(&response).await
            }
            other => {
                error!(client = %self.peer, error = %other, "Unrecoverable framing error");
                Err(ConnectionError::ParseError(other))
            }
        }
    }

    /// Reads more data into the buffer. Returns false at end of stream.
    async fn read_more_data(&mut self) -> Result<bool, ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            error!(
                client = %self.peer,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(4096);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;
        if n == 0 {
            return Ok(false);
        }

        self.stats.bytes_read(n);
        trace!(client = %self.peer, bytes = n, "Read data");
        Ok(true)
    }

    /// Sends a response to the client.
    async fn send_response(&mut self, response: &RespValue) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(bytes.len());
        trace!(client = %self.peer, bytes = bytes.len(), "Sent response");
        Ok(())
    }
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Framing error that ends the connection
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// Client closed the stream
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Buffer size limit exceeded
    #[error("Buffer size limit exceeded")]
    BufferFull,
}

/// Runs a [`ConnectionHandler`] to completion, swallowing the normal ways a
/// connection ends.
pub async fn handle_connection<S>(
    stream: S,
    peer: String,
    registry: Arc<CommandRegistry>,
    stats: Arc<ConnectionStats>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, peer.clone(), registry, stats);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %peer, error = %e, "Connection ended with error");
            }
        }
    }
}
