//! Detection Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A detection error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for detection operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The content is not an image format we can measure, or its header is
    /// truncated/corrupt.
    #[display("could not decode image dimensions")]
    Dimensions,
    /// Reading from the underlying stream failed.
    #[display("I/O error")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io)
    }
}
