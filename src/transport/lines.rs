//! Newline-delimited JSON framing over any async byte stream.

use async_trait::async_trait;
use futures_util::{sink, stream};
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf,
};
use tokio::net::TcpStream;
use tracing::debug;

use super::{Connector, Link, TransportError};

/// Longest inbound line accepted, newline excluded. Longer lines are skipped.
pub const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

/// Wrap a duplex byte stream as a [`Link`] carrying one frame per line.
///
/// Blank lines, lines that are not UTF-8 and lines longer than
/// [`MAX_LINE_BYTES`] are skipped. The stream ends when the peer closes its side.
pub fn line_link<S>(io: S) -> Link
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    line_link_with_limit(io, MAX_LINE_BYTES)
}

/// [`line_link`] with an explicit line length limit.
pub fn line_link_with_limit<S>(io: S, max_line: usize) -> Link
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(io);

    let lines = LineReader {
        reader: BufReader::new(reader),
        line: Vec::new(),
        max_line,
    };
    let frames = stream::unfold(lines, |mut lines| async move {
        let frame = lines.next_frame().await?;
        Some((frame, lines))
    });

    let lines = sink::unfold(writer, |mut writer, frame: String| async move {
        writer.write_all(frame.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok::<_, TransportError>(writer)
    });

    Link {
        sink: Box::pin(lines),
        stream: Box::pin(frames),
    }
}

struct LineReader<S> {
    reader: BufReader<ReadHalf<S>>,
    line: Vec<u8>,
    max_line: usize,
}

impl<S: AsyncRead> LineReader<S> {
    /// Next usable line, or `None` at EOF.
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.read_bounded().await {
                // EOF
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(TransportError::Io(e))),
            }

            if self.overlong() {
                debug!(max_bytes = self.max_line, "skipping overlong line");
                if let Err(e) = self.skip_rest_of_line().await {
                    return Some(Err(TransportError::Io(e)));
                }
                continue;
            }

            let Ok(text) = std::str::from_utf8(&self.line) else {
                debug!(bytes = self.line.len(), "skipping line that is not UTF-8");
                continue;
            };
            let trimmed = text.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Some(Ok(trimmed.to_string()));
        }
    }

    /// Read up to the next newline, but never more than one byte past the limit.
    async fn read_bounded(&mut self) -> std::io::Result<usize> {
        self.line.clear();
        let limit = self.max_line as u64 + 1;
        (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut self.line)
            .await
    }

    fn overlong(&self) -> bool {
        self.line.last() != Some(&b'\n') && self.line.len() > self.max_line
    }

    async fn skip_rest_of_line(&mut self) -> std::io::Result<()> {
        loop {
            if self.read_bounded().await? == 0 || self.line.last() == Some(&b'\n') {
                self.line.clear();
                return Ok(());
            }
        }
    }
}

/// Connects to `tcp://host:port` endpoints speaking newline-delimited JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, endpoint: &str) -> Result<Link, TransportError> {
        let addr = endpoint.strip_prefix("tcp://").unwrap_or(endpoint);
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| TransportError::Connect(format!("{addr}: {e}")))?;
        stream.set_nodelay(true)?;
        Ok(line_link(stream))
    }
}
