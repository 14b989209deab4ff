//! Sync Error Types
//!
//! Every failure leaving this crate is one of a handful of caller-facing
//! categories. Errors from the lower crates stay attached as children of the
//! error tree, so nothing about the cause is lost when mapping.

use derive_more::{Display, Error};
use gitshelf_index::error::{Error as IndexError, ErrorKind as IndexErrorKind};
use gitshelf_storage::error::{Error as StorageError, ErrorKind as StorageErrorKind};

/// A sync error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// None of them carry the credential used for remote requests.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input shape or size.
    #[display("invalid input: {_0}")]
    Validation(#[error(not(source))] String),
    /// Repository, file or other record does not exist (for this user).
    #[display("not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Attempt to act on another user's data.
    #[display("permission denied: {_0}")]
    Permission(#[error(not(source))] String),
    #[display("credential not configured, please provide one")]
    CredentialMissing,
    /// Repository or branch missing, or hidden from the configured credential.
    #[display("repository not accessible: {_0}")]
    NotAccessible(#[error(not(source))] String),
    /// The remote backend could not be reached or rejected the request.
    #[display("remote backend unavailable during {operation}")]
    RemoteUnavailable { operation: &'static str },
    /// Remote path already occupied on upload.
    #[display("remote path already occupied: {_0}")]
    Conflict(#[error(not(source))] String),
    /// Webhook signature missing or wrong.
    #[display("webhook signature verification failed")]
    Signature,
    /// The credential cache could not be updated.
    #[display("credential cache unavailable")]
    Cache,
    #[display("index error")]
    Index,
}

impl ErrorKind {
    /// Returns `true` if resubmitting the same request might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteUnavailable { .. } | Self::Cache | Self::Index)
    }
}

/// Map a remote backend failure onto the caller-facing taxonomy, keeping the
/// backend error as the cause.
#[track_caller]
pub(crate) fn remote(err: StorageError, operation: &'static str) -> Error {
    let kind = match &*err {
        StorageErrorKind::NotAccessible(repo) => ErrorKind::NotAccessible(repo.clone()),
        StorageErrorKind::AlreadyExists(path) => ErrorKind::Conflict(path.clone()),
        StorageErrorKind::InvalidPath(path) => ErrorKind::Validation(format!("invalid remote path {path}")),
        StorageErrorKind::InvalidRepository(url) => ErrorKind::Validation(format!("invalid repository URL {url}")),
        StorageErrorKind::TreeTooLarge(what) => ErrorKind::Validation(format!("remote tree too large: {what}")),
        _ => ErrorKind::RemoteUnavailable { operation },
    };
    err.raise(kind)
}

/// Map an index failure: uniqueness violations become
/// [`ErrorKind::Conflict`], anything else is [`ErrorKind::Index`].
#[track_caller]
pub(crate) fn index(err: IndexError) -> Error {
    let kind = match &*err {
        IndexErrorKind::Conflict(what) => ErrorKind::Conflict(what.clone()),
        _ => ErrorKind::Index,
    };
    err.raise(kind)
}
