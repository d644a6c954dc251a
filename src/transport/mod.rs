//! Newline-delimited JSON framing over a bidirectional byte stream
//! (spec.md §4.1).
//!
//! A transport reads and writes one JSON object per line. On send it
//! serialises the envelope, appends `\n`, and flushes. On receive it
//! reads one line, strips a trailing `\r`, skips empty lines, and hands
//! the rest to [`crate::protocol::parse_message`].
//!
//! Once a write fails the writer half transitions to disconnected and
//! must not be reused — this mirrors the teacher's `StdioTransport`,
//! generalised from stdio to any `AsyncRead`/`AsyncWrite` stream (TCP in
//! production, `tokio::io::duplex` in tests). The reader and writer
//! halves are split so one task can block on `read_line` while other,
//! short-lived dispatch tasks send responses concurrently (spec.md §5):
//! response ordering on the wire is not guaranteed, only correlation by
//! request id.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};

/// The read half of a framed transport.
pub struct LineReader<R> {
    reader: BufReader<R>,
}

impl<R: tokio::io::AsyncRead + Unpin> LineReader<R> {
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Reads the next non-empty line, or `None` on EOF.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails.
    pub async fn read_line(&mut self) -> std::io::Result<Option<String>> {
        loop {
            let mut line = String::new();
            let n = self.reader.read_line(&mut line).await?;
            if n == 0 {
                return Ok(None);
            }
            let trimmed = line.trim_end_matches(['\n', '\r']);
            if trimmed.is_empty() {
                continue;
            }
            return Ok(Some(trimmed.to_string()));
        }
    }
}

/// The write half of a framed transport.
///
/// Safe to wrap in `Arc<tokio::sync::Mutex<_>>` and share across the
/// concurrent dispatch tasks spawned for a single session.
pub struct LineWriter<W> {
    writer: BufWriter<W>,
    disconnected: AtomicBool,
}

impl<W: tokio::io::AsyncWrite + Unpin> LineWriter<W> {
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            disconnected: AtomicBool::new(false),
        }
    }

    /// Returns `true` once a write has failed; the writer must not be
    /// reused after this.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }

    /// Serialises `value` and writes it as one newline-terminated line.
    ///
    /// # Errors
    ///
    /// Returns an error (and marks the writer disconnected) if
    /// serialisation or the underlying write/flush fails.
    pub async fn write_line<T: Serialize>(&mut self, value: &T) -> std::io::Result<()> {
        let result = self.try_write_line(value).await;
        if result.is_err() {
            self.disconnected.store(true, Ordering::Release);
        }
        result
    }

    async fn try_write_line<T: Serialize>(&mut self, value: &T) -> std::io::Result<()> {
        let mut encoded = serde_json::to_vec(value)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        encoded.push(b'\n');
        self.writer.write_all(&encoded).await?;
        self.writer.flush().await
    }
}

/// Splits a duplex stream into its framed read and write halves.
pub fn split<S>(stream: S) -> (LineReader<tokio::io::ReadHalf<S>>, LineWriter<tokio::io::WriteHalf<S>>)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite,
{
    let (read_half, write_half) = tokio::io::split(stream);
    (LineReader::new(read_half), LineWriter::new(write_half))
}
