//! Git-compatible content hashing.
//!
//! Remote repositories address file contents by the SHA-1 of a *blob object*:
//! the bytes `"blob " + <decimal size> + NUL` followed by the raw content.
//! Computing the same value locally lets the sync engine deduplicate uploads
//! against what the remote already stores, and lets listings coming back from
//! the remote (which carry the blob hash) be compared without downloading.
//!
//! The declared size is part of the hashed header, so it must match the
//! number of bytes actually read. A mismatch is reported as
//! [`SizeMismatch`](error::ErrorKind::SizeMismatch) rather than silently
//! producing a hash that the remote would never agree with.

pub mod error;
mod reader;

pub use crate::reader::HashingReader;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use futures::io::{AsyncRead, AsyncReadExt};
use sha1::{Digest, Sha1};
use std::io::{self, Read, Write};

/// Length of a hex-encoded SHA-1 digest.
pub const HASH_HEX_LEN: usize = 40;

const CHUNK_SIZE: usize = 8 * 1024;

/// Incremental blob hasher.
///
/// The object header is written on construction, content is fed through
/// [`update`](Self::update) (or the [`Write`] impl), and
/// [`finalize`](Self::finalize) checks that exactly the declared number of
/// bytes went in.
#[derive(Clone)]
pub struct BlobHasher {
    digest: Sha1,
    declared: u64,
    written: u64,
}

impl BlobHasher {
    pub fn new(declared: u64) -> Self {
        let mut digest = Sha1::new();
        digest.update(format!("blob {declared}\0").as_bytes());
        Self { digest, declared, written: 0 }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
        self.written += data.len() as u64;
    }

    /// Number of content bytes fed in so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn declared(&self) -> u64 {
        self.declared
    }

    /// Finish hashing and return the lowercase hex digest.
    pub fn finalize(self) -> Result<String> {
        if self.written != self.declared {
            exn::bail!(ErrorKind::SizeMismatch {
                declared: self.declared,
                actual: self.written,
            });
        }
        Ok(hex::encode(self.digest.finalize()))
    }
}

impl Write for BlobHasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Hash everything readable from `reader`, which must yield exactly
/// `declared` bytes.
///
/// At most `declared + 1` bytes are pulled from the reader: enough to prove
/// that it holds more than declared without draining an unbounded source.
/// When sizes agree the reader is fully consumed; callers needing the bytes
/// again must rewind or supply a fresh reader.
///
/// # Examples
///
/// ```
/// let hash = gitshelf_hash::compute(&b"test content\n"[..], 13).unwrap();
/// assert_eq!(hash, "d670460b4b4aece5915caf5c68d12f560a9fe3e4");
/// ```
pub fn compute(reader: impl Read, declared: u64) -> Result<String> {
    let mut hasher = BlobHasher::new(declared);
    io::copy(&mut reader.take(declared.saturating_add(1)), &mut hasher).or_raise(|| ErrorKind::Io)?;
    hasher.finalize()
}

/// Hash an in-memory buffer. The declared size is the buffer length, so this
/// cannot fail.
pub fn compute_bytes(data: &[u8]) -> String {
    let mut hasher = BlobHasher::new(data.len() as u64);
    hasher.update(data);
    hex::encode(hasher.digest.finalize())
}

/// Async counterpart of [`compute`], for runtime-agnostic
/// [`AsyncRead`](futures::io::AsyncRead)ers.
pub async fn compute_async<R: AsyncRead + Unpin>(reader: R, declared: u64) -> Result<String> {
    let mut hasher = BlobHasher::new(declared);
    let mut reader = reader.take(declared.saturating_add(1));
    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        let read = reader.read(&mut chunk).await.or_raise(|| ErrorKind::Io)?;
        if read == 0 {
            break;
        }
        hasher.update(&chunk[..read]);
    }
    hasher.finalize()
}

/// Whether `value` looks like a hex-encoded SHA-1 digest.
pub fn is_hash(value: &str) -> bool {
    value.len() == HASH_HEX_LEN && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Cursor;

    #[rstest]
    #[case(b"", "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391")]
    #[case(b"hello world\n", "3b18e512dba79e4c8300dd08aeb37f8e728b8dad")]
    #[case(b"what is up, doc?", "bd9dbf5aae1a3862dd1526723246b20206e5fc37")]
    #[case(b"test content\n", "d670460b4b4aece5915caf5c68d12f560a9fe3e4")]
    fn test_known_vectors(#[case] content: &[u8], #[case] expected: &str) {
        assert_eq!(compute(Cursor::new(content), content.len() as u64).unwrap(), expected);
        assert_eq!(compute_bytes(content), expected);
    }

    #[test]
    fn test_declared_size_too_large() {
        let err = compute(Cursor::new(b"abc"), 4).unwrap_err();
        assert_eq!(*err, ErrorKind::SizeMismatch { declared: 4, actual: 3 });
    }

    #[test]
    fn test_declared_size_too_small() {
        let err = compute(Cursor::new(b"abcdef"), 2).unwrap_err();
        // Only one byte past the declared size is ever read.
        assert_eq!(*err, ErrorKind::SizeMismatch { declared: 2, actual: 3 });
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let mut hasher = BlobHasher::new(12);
        hasher.update(b"hello ");
        hasher.update(b"world\n");
        assert_eq!(hasher.written(), 12);
        assert_eq!(hasher.finalize().unwrap(), "3b18e512dba79e4c8300dd08aeb37f8e728b8dad");
    }

    #[test]
    fn test_large_content_crosses_chunks() {
        let data = vec![0x5au8; CHUNK_SIZE * 3 + 17];
        assert_eq!(compute(Cursor::new(&data), data.len() as u64).unwrap(), compute_bytes(&data));
    }

    #[tokio::test]
    async fn test_compute_async() {
        let data = b"what is up, doc?";
        let hash = compute_async(futures::io::Cursor::new(&data[..]), 16).await.unwrap();
        assert_eq!(hash, "bd9dbf5aae1a3862dd1526723246b20206e5fc37");
        let err = compute_async(futures::io::Cursor::new(&data[..]), 20).await.unwrap_err();
        assert!(matches!(*err, ErrorKind::SizeMismatch { declared: 20, actual: 16 }));
    }

    #[rstest]
    #[case("e69de29bb2d1d6434b8b29ae775ad8c2e48c5391", true)]
    #[case("E69DE29BB2D1D6434B8B29AE775AD8C2E48C5391", false)]
    #[case("e69de29b", false)]
    #[case("zzzde29bb2d1d6434b8b29ae775ad8c2e48c5391", false)]
    fn test_is_hash(#[case] value: &str, #[case] expected: bool) {
        assert_eq!(is_hash(value), expected);
    }
}
