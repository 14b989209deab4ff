//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
/// None of them carry the credential that was used for the request.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Object or repository does not exist
    #[display("not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// An object already occupies the path (uploads never overwrite)
    #[display("already exists: {_0}")]
    AlreadyExists(#[error(not(source))] String),
    /// Credential rejected for this operation
    #[display("permission denied: {_0}")]
    PermissionDenied(#[error(not(source))] String),
    /// Repository or branch missing, or unreachable with the supplied credential
    #[display("repository not accessible: {_0}")]
    NotAccessible(#[error(not(source))] String),
    /// Path contains invalid characters or escapes the repository root
    #[display("invalid path: {_0}")]
    InvalidPath(#[error(not(source))] String),
    /// Repository URL could not be parsed into an owner and name
    #[display("invalid repository URL: {_0}")]
    InvalidRepository(#[error(not(source))] String),
    /// Connection-level failure talking to the backend
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// The backend did not answer within the configured timeout
    #[display("timed out during {_0}")]
    Timeout(#[error(not(source))] String),
    /// Tree walk exceeded its configured bounds
    #[display("remote tree too large: {_0}")]
    TreeTooLarge(#[error(not(source))] String),
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_) | Self::BackendError(_))
    }
}
