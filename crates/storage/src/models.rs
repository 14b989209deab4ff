//! Storage models.
//!
//! Types describing what the remote backend holds and how to reach it.

use crate::error::{ErrorKind, Result};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

// Accepts `https://host/owner/name`, `git@host:owner/name` and bare
// `owner/name`, each with an optional `.git` suffix and trailing slash.
static REPOSITORY_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://[^/]+/|git@[^:/]+:)?([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+?)(?:\.git)?/?$").unwrap()
});

/// Opaque secret used to authenticate against the remote backend.
///
/// `Debug` never prints the secret, so credentials can sit inside structs
/// that end up in logs or error trees.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// A repository (and branch) on the remote backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
    pub branch: String,
}

impl RepoRef {
    /// Parse a repository URL into owner and name.
    ///
    /// ```
    /// use gitshelf_storage::RepoRef;
    /// let repo = RepoRef::parse("https://github.com/octo/pictures.git", "main").unwrap();
    /// assert_eq!(repo.full_name(), "octo/pictures");
    /// assert_eq!(repo.branch, "main");
    /// ```
    pub fn parse(url: &str, branch: impl Into<String>) -> Result<Self> {
        let captures = REPOSITORY_URL_REGEX
            .captures(url.trim())
            .ok_or_else(|| exn::Exn::from(ErrorKind::InvalidRepository(url.to_string())))?;
        Ok(Self {
            owner: captures[1].to_string(),
            name: captures[2].to_string(),
            branch: branch.into(),
        })
    }

    /// `owner/name`, the form push notifications identify repositories by.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// A file discovered in a remote listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub name: String,
    /// Path relative to the repository root.
    pub path: String,
    pub size: u64,
    /// Blob hash as reported by the remote.
    pub sha: String,
    pub download_url: Option<String>,
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEntry {
    Dir { name: String, path: String },
    File(RemoteFile),
}

impl RemoteEntry {
    pub fn path(&self) -> &str {
        match self {
            Self::Dir { path, .. } => path,
            Self::File(file) => &file.path,
        }
    }
}

/// Result of a delete that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Removed,
    /// Nothing was at the path. Callers treat this as success.
    AlreadyAbsent,
}

/// Bounds for a recursive tree walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkLimits {
    /// Deepest directory level that may be listed (root is depth 0).
    pub max_depth: usize,
    /// Maximum number of entries (files and directories) yielded.
    pub max_entries: usize,
}

impl Default for WalkLimits {
    fn default() -> Self {
        Self { max_depth: 32, max_entries: 100_000 }
    }
}
