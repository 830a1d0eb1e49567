//! Buffered, delimiter-aware byte stream shared by every transport.

mod interactive;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter};

use crate::buffer::InputBuffer;
use crate::config::TubeConfig;
use crate::error::{Result, TubeError};
use crate::payload::Payload;

pub type Source = Box<dyn AsyncRead + Send + Unpin>;
pub type Sink = Box<dyn AsyncWrite + Send + Unpin>;

/// Releases the transport behind a tube.
///
/// Installed by the adapter that built the tube. `sink` is the tube's output
/// stream, already flushed.
#[async_trait]
pub trait Closer: Send {
    async fn close(&mut self, sink: &mut Sink) -> Result<()>;
}

/// Close hook for tubes over a plain stream: shuts down the write side.
#[derive(Debug, Default, Clone, Copy)]
pub struct Detached;

#[async_trait]
impl Closer for Detached {
    async fn close(&mut self, sink: &mut Sink) -> Result<()> {
        sink.shutdown().await?;
        Ok(())
    }
}

/// A wrapped I/O pipeline.
///
/// Reads go through a single input buffer; writes go through a buffered sink
/// that is flushed at the end of every send.
pub struct Tube<C = Detached> {
    input: InputBuffer,
    output: BufWriter<Sink>,
    newline: u8,
    closer: C,
}

impl Tube<Detached> {
    /// Wraps any bidirectional byte stream.
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::with_config(stream, &TubeConfig::default())
    }

    pub fn with_config<S>(stream: S, config: &TubeConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::from_parts(Box::new(reader), Box::new(writer), Detached, config)
    }
}

impl<C: Closer> Tube<C> {
    pub fn from_parts(source: Source, sink: Sink, closer: C, config: &TubeConfig) -> Self {
        Self {
            input: InputBuffer::new(source, config.read_chunk),
            output: BufWriter::new(sink),
            newline: config.newline,
            closer,
        }
    }

    pub fn newline(&self) -> u8 {
        self.newline
    }

    pub fn set_newline(&mut self, newline: u8) {
        self.newline = newline;
    }

    /// Number of received bytes waiting in the input buffer.
    pub fn buffered(&self) -> usize {
        self.input.len()
    }

    pub(crate) fn closer(&self) -> &C {
        &self.closer
    }

    pub(crate) fn closer_mut(&mut self) -> &mut C {
        &mut self.closer
    }

    /// Reads exactly `count` bytes.
    ///
    /// With a timeout, fails with [`TubeError::Timeout`] once it expires; bytes
    /// that arrived in the meantime stay buffered for the next receive.
    pub async fn recv_n(&mut self, count: usize, timeout: Option<Duration>) -> Result<Vec<u8>> {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, self.read_exact(count))
                .await
                .map_err(|_| TubeError::Timeout(limit))?,
            None => self.read_exact(count).await,
        }
    }

    /// Reads until `delimiter` is received. The delimiter is always consumed and
    /// is left out of the result when `drop` is set.
    pub async fn recv_until<'a>(
        &mut self,
        delimiter: impl Into<Payload<'a>>,
        drop: bool,
    ) -> Result<Vec<u8>> {
        let delimiter = delimiter.into().into_bytes();
        self.read_through(&delimiter, drop).await
    }

    /// Reads one line terminated by the configured newline.
    pub async fn recv_line(&mut self, keep_ends: bool) -> Result<Vec<u8>> {
        let newline = [self.newline];
        self.read_through(&newline, !keep_ends).await
    }

    /// Reads exactly `count` lines. Returns no lines at all if any read fails.
    pub async fn recv_lines(&mut self, count: usize, keep_ends: bool) -> Result<Vec<Vec<u8>>> {
        let mut lines = Vec::with_capacity(count);
        for _ in 0..count {
            lines.push(self.recv_line(keep_ends).await?);
        }
        Ok(lines)
    }

    /// Reads until the peer closes its side of the stream.
    pub async fn recv_all(&mut self) -> Result<Vec<u8>> {
        while self.input.fill().await? > 0 {}
        Ok(self.input.take_all())
    }

    /// Writes `data` and returns exactly the bytes written.
    pub async fn send<'a>(&mut self, data: impl Into<Payload<'a>>) -> Result<Vec<u8>> {
        let data = data.into().into_bytes();
        write_through(&mut self.output, &data).await?;
        Ok(data)
    }

    pub async fn send_line<'a>(&mut self, data: impl Into<Payload<'a>>) -> Result<Vec<u8>> {
        let mut data = data.into().into_bytes();
        data.push(self.newline);
        self.send(data).await
    }

    /// Waits for `delimiter` (a prompt, usually) and then sends `data`.
    pub async fn send_after<'a, 'b>(
        &mut self,
        delimiter: impl Into<Payload<'a>>,
        data: impl Into<Payload<'b>>,
    ) -> Result<Vec<u8>> {
        let data = data.into().into_bytes();
        self.recv_until(delimiter, false).await?;
        self.send(data).await
    }

    pub async fn send_line_after<'a, 'b>(
        &mut self,
        delimiter: impl Into<Payload<'a>>,
        data: impl Into<Payload<'b>>,
    ) -> Result<Vec<u8>> {
        let data = data.into().into_bytes();
        self.recv_until(delimiter, false).await?;
        self.send_line(data).await
    }

    /// Sends `data`, then returns everything received up to and including `delimiter`.
    pub async fn send_then<'a, 'b>(
        &mut self,
        delimiter: impl Into<Payload<'a>>,
        data: impl Into<Payload<'b>>,
    ) -> Result<Vec<u8>> {
        let delimiter = delimiter.into().into_bytes();
        self.send(data).await?;
        self.recv_until(delimiter, false).await
    }

    pub async fn send_line_then<'a, 'b>(
        &mut self,
        delimiter: impl Into<Payload<'a>>,
        data: impl Into<Payload<'b>>,
    ) -> Result<Vec<u8>> {
        let delimiter = delimiter.into().into_bytes();
        self.send_line(data).await?;
        self.recv_until(delimiter, false).await
    }

    /// Drops whatever is already buffered without waiting for more.
    /// Returns the number of bytes discarded.
    pub fn clean(&mut self) -> usize {
        self.input.discard()
    }

    /// Flushes pending output and runs the transport's close hook.
    pub async fn close(&mut self) -> Result<()> {
        close_parts(&mut self.output, &mut self.closer).await
    }

    pub(crate) async fn flush_output(&mut self) {
        flush_best_effort(&mut self.output).await;
    }

    async fn read_exact(&mut self, count: usize) -> Result<Vec<u8>> {
        if !self.input.fill_to(count).await? {
            return Err(TubeError::IncompleteRead { expected: count, received: self.input.len() });
        }
        Ok(self.input.consume(count))
    }

    async fn read_through(&mut self, delimiter: &[u8], drop: bool) -> Result<Vec<u8>> {
        let Some((&first, rest)) = delimiter.split_first() else {
            return Err(TubeError::EmptyDelimiter);
        };

        let mut scanned = 0;
        loop {
            let found = self.input.as_slice()[scanned..].iter().position(|&b| b == first);
            let Some(at) = found.map(|offset| scanned + offset) else {
                scanned = self.input.len();
                if self.input.fill().await? == 0 {
                    return Err(self.unexpected_eof());
                }
                continue;
            };

            // Peek at the rest of the delimiter; it may straddle reads.
            let end = at + delimiter.len();
            if !self.input.fill_to(end).await? {
                return Err(self.unexpected_eof());
            }
            if &self.input.as_slice()[at + 1..end] == rest {
                let mut received = self.input.consume(end);
                if drop {
                    received.truncate(at);
                }
                return Ok(received);
            }
            scanned = at + 1;
        }
    }

    fn unexpected_eof(&self) -> TubeError {
        TubeError::UnexpectedEof { buffered: self.input.len() }
    }
}

impl<C> fmt::Debug for Tube<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tube")
            .field("newline", &self.newline)
            .field("buffered", &self.input.len())
            .finish_non_exhaustive()
    }
}

async fn write_through(output: &mut BufWriter<Sink>, data: &[u8]) -> Result<()> {
    let mut written = 0;
    while written < data.len() {
        match output.write(&data[written..]).await? {
            0 => return Err(TubeError::ShortWrite { written, expected: data.len() }),
            n => written += n,
        }
    }
    output.flush().await?;
    Ok(())
}

async fn flush_best_effort(output: &mut BufWriter<Sink>) {
    if let Err(err) = output.flush().await {
        log::debug!("tube: flush before close failed: {err}");
    }
}

async fn close_parts<C: Closer>(output: &mut BufWriter<Sink>, closer: &mut C) -> Result<()> {
    flush_best_effort(output).await;
    closer.close(output.get_mut()).await
}
