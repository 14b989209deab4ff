//! Index Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use exn::ResultExt;

/// An index error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for index operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// A uniqueness constraint rejected the write.
    #[display("conflicting record: {_0}")]
    Conflict(#[error(not(source))] String),
    /// Stored data could not be converted into its model.
    #[display("invalid index data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database)
    }

    /// Classify a failed write: uniqueness violations become
    /// [`Conflict`](Self::Conflict), everything else is a database error.
    pub(crate) fn from_write(err: &sqlx::Error, what: impl Into<String>) -> Self {
        match err {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::Conflict(what.into()),
            _ => Self::Database,
        }
    }
}

/// Raise write failures with [`ErrorKind::from_write`], keeping the
/// original `sqlx` error as the source.
pub(crate) trait WriteResultExt<T> {
    fn or_raise_write(self, what: impl FnOnce() -> String) -> Result<T>;
}

impl<T> WriteResultExt<T> for sqlx::Result<T> {
    #[track_caller]
    fn or_raise_write(self, what: impl FnOnce() -> String) -> Result<T> {
        match self {
            Ok(value) => Ok(value),
            Err(err) => {
                let kind = ErrorKind::from_write(&err, what());
                Err(err).or_raise(|| kind)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_database_errors_are_retryable() {
        assert!(ErrorKind::Database.is_retryable());
        assert!(!ErrorKind::Migration.is_retryable());
        assert!(!ErrorKind::Conflict("files/ab/abc.png".into()).is_retryable());
    }

    #[test]
    fn test_non_database_write_errors() {
        assert_eq!(ErrorKind::from_write(&sqlx::Error::RowNotFound, "x"), ErrorKind::Database);
    }
}
