//! Peek-decide-stream for async readers.
//!
//! Thin wrapper around [`futures::io`] primitives ([`take`](AsyncReadExt::take),
//! [`Cursor`], [`Chain`]): read a bounded prefix to inspect, then hand back a
//! single reader that replays the prefix followed by the untouched remainder.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use futures::io::{AsyncRead, AsyncReadExt, Chain, Cursor};

pub struct AsyncPeekableReader<R> {
    inner: R,
    buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin> AsyncPeekableReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, buffer: Vec::new() }
    }

    /// Read up to `limit` bytes from the start of the stream.
    ///
    /// Successive calls do not accumulate:
    /// - `peek(256)` puts 256 bytes in the buffer, returns 256 bytes
    /// - `peek(512)` reads an additional 256 bytes, returns 512 bytes
    /// - `peek(128)` immediately returns 128 bytes (already buffered)
    ///
    /// Returns fewer bytes than asked for only when the stream is shorter.
    pub async fn peek(&mut self, limit: usize) -> Result<&[u8]> {
        if self.buffer.len() >= limit {
            return Ok(&self.buffer[..limit]);
        }
        let needed = (limit - self.buffer.len()) as u64;
        (&mut self.inner).take(needed).read_to_end(&mut self.buffer).await.or_raise(|| ErrorKind::Io)?;
        Ok(&self.buffer[..self.buffer.len().min(limit)])
    }

    /// Data buffered so far.
    pub fn head(&self) -> &[u8] {
        &self.buffer
    }

    /// Convert into a reader that replays the buffered head, then streams
    /// the rest of the inner reader.
    pub fn into_reader(self) -> Chain<Cursor<Vec<u8>>, R> {
        Cursor::new(self.buffer).chain(self.inner)
    }
}
