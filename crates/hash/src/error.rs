//! Hashing Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A hashing error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for hashing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The number of bytes read did not match the size declared up front.
    /// This is a caller error: the declared size is part of the hash.
    #[display("declared size {declared} does not match content size {actual}")]
    SizeMismatch { declared: u64, actual: u64 },
    /// Reading the content failed.
    #[display("I/O error while hashing")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io)
    }
}
