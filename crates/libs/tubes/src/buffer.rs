use std::io::{self, ErrorKind};

use tokio::io::AsyncReadExt;

use crate::tube::Source;

pub const DEFAULT_READ_CHUNK: usize = 4096;

/// Single read buffer in front of a tube's readable stream.
///
/// Bytes stay buffered until a receive operation consumes them, which is what
/// lets the delimiter scan look ahead without losing data.
pub struct InputBuffer {
    source: Source,
    buffer: Vec<u8>,
    offset: usize,
    chunk: usize,
}

impl InputBuffer {
    pub fn new(source: Source, chunk: usize) -> Self {
        Self { source, buffer: Vec::new(), offset: 0, chunk: chunk.max(1) }
    }

    pub fn len(&self) -> usize {
        self.buffer.len() - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer[self.offset..]
    }

    /// Reads the next chunk from the source, returning 0 at end of stream.
    ///
    /// Cancel safe: bytes are only appended once the underlying read completes.
    pub async fn fill(&mut self) -> io::Result<usize> {
        self.compact();
        self.buffer.reserve(self.chunk);
        loop {
            match self.source.read_buf(&mut self.buffer).await {
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                result => return result,
            }
        }
    }

    /// Reads until at least `n` bytes are buffered. `false` means the stream ended first.
    pub async fn fill_to(&mut self, n: usize) -> io::Result<bool> {
        while self.len() < n {
            if self.fill().await? == 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn consume(&mut self, n: usize) -> Vec<u8> {
        let n = n.min(self.len());
        let out = self.buffer[self.offset..self.offset + n].to_vec();
        self.advance(n);
        out
    }

    pub fn take_all(&mut self) -> Vec<u8> {
        self.consume(self.len())
    }

    pub fn discard(&mut self) -> usize {
        let n = self.len();
        self.advance(n);
        n
    }

    fn advance(&mut self, n: usize) {
        self.offset += n;
        if self.offset == self.buffer.len() {
            self.buffer.clear();
            self.offset = 0;
        }
    }

    fn compact(&mut self) {
        if self.offset > 0 {
            self.buffer.drain(..self.offset);
            self.offset = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    fn buffer_over(data: &'static [u8], chunk: usize) -> InputBuffer {
        InputBuffer::new(Box::new(data), chunk)
    }

    #[tokio::test]
    async fn fill_reads_at_most_what_arrives() {
        let mut input = buffer_over(b"hello world", 4);
        assert!(input.is_empty());

        input.fill_to(6).await.unwrap();
        assert!(input.len() >= 6);
        assert_eq!(&input.as_slice()[..6], b"hello ");

        assert_eq!(input.consume(6), b"hello ");
        assert!(input.fill_to(5).await.unwrap());
        assert_eq!(input.take_all(), b"world");
        assert!(!input.fill_to(1).await.unwrap());
    }

    #[tokio::test]
    async fn consume_is_bounded_by_buffered_bytes() {
        let mut input = buffer_over(b"abc", 16);
        input.fill().await.unwrap();
        assert_eq!(input.consume(10), b"abc");
        assert!(input.is_empty());
    }

    #[tokio::test]
    async fn discard_drops_only_buffered_bytes() {
        let (mut peer, local) = tokio::io::duplex(64);
        let mut input = InputBuffer::new(Box::new(local), 64);

        peer.write_all(b"first").await.unwrap();
        input.fill().await.unwrap();
        assert_eq!(input.discard(), 5);
        assert_eq!(input.discard(), 0);

        peer.write_all(b"second").await.unwrap();
        input.fill().await.unwrap();
        assert_eq!(input.take_all(), b"second");
    }
}
