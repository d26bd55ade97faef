//! stdio transport for MCP server.
//!
//! This module implements the stdio transport as specified by MCP:
//!
//! - Messages are UTF-8 encoded JSON-RPC
//! - Messages are delimited by newlines (`\n` or `\r\n`, never a lone `\r`)
//! - Messages must not contain embedded newlines
//! - stdin: receives messages from client
//! - stdout: sends messages to client, and nothing else
//! - stderr: diagnostics (see [`crate::logging`])
//!
//! Both halves are generic over the tokio I/O traits so sessions can be
//! driven from in-memory buffers.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::mcp::protocol::{encode, Outgoing};

/// Splits an input stream into non-blank lines.
///
/// Partially read data is kept in an internal buffer across calls, so
/// [`LineFramer::next_line`] may be cancelled by `tokio::select!` without
/// losing input.
pub struct LineFramer<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> LineFramer<R> {
    /// Wraps a buffered reader.
    #[must_use]
    pub const fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    /// Reads the next non-blank line, without its terminator.
    ///
    /// Returns `None` once the input is closed (EOF). A final line without a
    /// trailing newline is still returned. Invalid UTF-8 is replaced rather
    /// than rejected; such a line fails decoding later and is answered with
    /// a parse error.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from the underlying stream fails.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        loop {
            let bytes_read = self.reader.read_until(b'\n', &mut self.buf).await?;

            if bytes_read == 0 && self.buf.is_empty() {
                return Ok(None);
            }

            let mut raw = std::mem::take(&mut self.buf);
            if raw.last() == Some(&b'\n') {
                raw.pop();
                if raw.last() == Some(&b'\r') {
                    raw.pop();
                }
            }

            let line = String::from_utf8_lossy(&raw);
            if line.trim().is_empty() {
                continue;
            }

            return Ok(Some(line.into_owned()));
        }
    }
}

/// The only path to the protocol output stream.
///
/// Constructed once at startup from the real stdout handle; every write
/// is a codec-encoded message followed by a newline and a flush.
pub struct OutputGuard<W> {
    writer: W,
    sent: u64,
}

impl<W: AsyncWrite + Unpin> OutputGuard<W> {
    /// Takes ownership of the protocol output stream.
    #[must_use]
    pub const fn new(writer: W) -> Self {
        Self { writer, sent: 0 }
    }

    /// Encodes and writes one message.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub async fn send(&mut self, message: &Outgoing) -> io::Result<()> {
        let line = encode(message).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        // MCP stdio framing: no embedded newlines
        debug_assert!(
            !line.contains('\n'),
            "JSON message must not contain embedded newlines"
        );

        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        self.sent += 1;

        tracing::trace!(id = ?message.id(), "Sent message");
        Ok(())
    }

    /// Number of messages written so far.
    #[must_use]
    pub const fn sent(&self) -> u64 {
        self.sent
    }

    /// Releases the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl OutputGuard<tokio::io::Stdout> {
    /// Captures the process stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}
