//! Pass-through hashing for async readers.

use crate::BlobHasher;
use crate::error::Result;
use futures::io::AsyncRead;
use pin_project_lite::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

pin_project! {
    /// An [`AsyncRead`] adapter that hashes every byte it hands out.
    ///
    /// Lets a stream be buffered (or forwarded) and hashed in the same pass,
    /// instead of reading it twice.
    pub struct HashingReader<R> {
        #[pin]
        inner: R,
        hasher: BlobHasher,
    }
}

impl<R: AsyncRead> HashingReader<R> {
    pub fn new(inner: R, declared: u64) -> Self {
        Self { inner, hasher: BlobHasher::new(declared) }
    }

    /// Bytes passed through so far.
    pub fn bytes_read(&self) -> u64 {
        self.hasher.written()
    }

    /// Consume the reader and return the blob hash of everything read.
    pub fn finalize(self) -> Result<String> {
        self.hasher.finalize()
    }
}

impl<R: AsyncRead> AsyncRead for HashingReader<R> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<io::Result<usize>> {
        let this = self.project();
        let read = ready!(this.inner.poll_read(cx, buf))?;
        this.hasher.update(&buf[..read]);
        Poll::Ready(Ok(read))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use futures::io::{AsyncReadExt, Cursor};

    #[tokio::test]
    async fn test_hashes_while_reading() {
        let mut reader = HashingReader::new(Cursor::new(b"hello world\n".to_vec()), 12);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello world\n");
        assert_eq!(reader.bytes_read(), 12);
        assert_eq!(reader.finalize().unwrap(), "3b18e512dba79e4c8300dd08aeb37f8e728b8dad");
    }

    #[tokio::test]
    async fn test_short_stream_is_a_mismatch() {
        let mut reader = HashingReader::new(Cursor::new(b"hello".to_vec()), 12);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        let err = reader.finalize().unwrap_err();
        assert_eq!(*err, ErrorKind::SizeMismatch { declared: 12, actual: 5 });
    }
}
