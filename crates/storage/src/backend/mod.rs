//! Remote backend trait and implementations.
//!
//! This module defines the [`RemoteBackend`] trait, the whole surface the
//! sync engine uses to reach the hosting backend, plus a GitHub contents-API
//! implementation and an in-memory implementation for tests.

mod github;
#[cfg(feature = "mock")]
mod mock;

pub use self::github::{CommitAuthor, GithubBackend};
#[cfg(feature = "mock")]
pub use self::mock::{MockBackend, Operation};
use crate::error::{ErrorKind, Result};
use crate::models::{Credential, DeleteOutcome, RemoteEntry, RepoRef, WalkLimits};
use async_stream::stream;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

pub type RemoteEntryStream<'a> = Pin<Box<dyn Stream<Item = Result<RemoteEntry>> + Send + 'a>>;

/// Unified interface for git hosting backends.
///
/// The backend is treated as an append-only content store: there is no
/// branching, merging or history here, only "put object at path", "delete
/// object at path" and directory listing.
///
/// # Path Handling
/// All paths are relative to the repository root and must be validated with
/// [`validate_path`](crate::validate_path) (or
/// [`validate_dir`](crate::validate_dir) for listings). Implementations
/// enforce this.
///
/// # Examples
///
/// ```
/// use futures::TryStreamExt;
/// use gitshelf_storage::{Credential, RemoteBackend, RemoteEntry, RepoRef, WalkLimits, error::Result};
///
/// async fn count_files(backend: &dyn RemoteBackend, credential: &Credential, repo: &RepoRef) -> Result<usize> {
///     let mut files = 0;
///     let mut walk = backend.walk(credential, repo, WalkLimits::default());
///     while let Some(entry) = walk.try_next().await? {
///         if let RemoteEntry::File(_) = entry {
///             files += 1;
///         }
///     }
///     Ok(files)
/// }
/// ```
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Name of the configured backend (used for logging only).
    fn name(&self) -> &str;

    /// Confirm that the repository and its branch exist and are reachable
    /// with the credential.
    ///
    /// Returns [`NotAccessible`](ErrorKind::NotAccessible) when either is
    /// missing or the credential cannot see them.
    async fn validate(&self, credential: &Credential, repo: &RepoRef) -> Result<()>;

    /// Create a new object at `path` on the repository's branch, recorded
    /// with the commit `message`.
    ///
    /// # Notes
    /// - Never overwrites: if an object already exists at exactly this path
    ///   the call fails with [`AlreadyExists`](ErrorKind::AlreadyExists).
    ///   Callers choose content-derived paths so that a collision means the
    ///   same bytes are already stored.
    async fn upload(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        path: &str,
        content: &[u8],
        message: &str,
    ) -> Result<()>;

    /// Delete the object at `path`.
    ///
    /// A missing object is not an error: it is reported as
    /// [`DeleteOutcome::AlreadyAbsent`].
    async fn delete(&self, credential: &Credential, repo: &RepoRef, path: &str, message: &str) -> Result<DeleteOutcome>;

    /// List the immediate children of `dir` (`""` for the repository root).
    async fn list_dir(&self, credential: &Credential, repo: &RepoRef, dir: &str) -> Result<Vec<RemoteEntry>>;

    /// Walk the whole tree depth-first, yielding directories (before their
    /// contents) and files.
    ///
    /// Uses an explicit stack rather than recursion. The walk stops at the
    /// first error, which is yielded as the final item; exceeding either
    /// bound in `limits` is reported as [`TreeTooLarge`](ErrorKind::TreeTooLarge).
    fn walk<'a>(&'a self, credential: &'a Credential, repo: &'a RepoRef, limits: WalkLimits) -> RemoteEntryStream<'a> {
        Box::pin(stream! {
            // (entry, depth of the directory the entry would open)
            let mut stack: Vec<(RemoteEntry, usize)> = Vec::new();
            match self.list_dir(credential, repo, "").await {
                Ok(entries) => stack.extend(entries.into_iter().rev().map(|e| (e, 1))),
                Err(e) => {
                    yield Err(e);
                    return;
                },
            }
            let mut yielded = 0usize;
            while let Some((entry, depth)) = stack.pop() {
                yielded += 1;
                if yielded > limits.max_entries {
                    yield Err(exn::Exn::from(ErrorKind::TreeTooLarge(format!(
                        "more than {} entries",
                        limits.max_entries
                    ))));
                    return;
                }
                let descend = match &entry {
                    RemoteEntry::Dir { path, .. } => Some(path.clone()),
                    RemoteEntry::File(_) => None,
                };
                yield Ok(entry);
                let Some(dir) = descend else { continue };
                if depth > limits.max_depth {
                    yield Err(exn::Exn::from(ErrorKind::TreeTooLarge(format!(
                        "{dir} is nested deeper than {} levels",
                        limits.max_depth
                    ))));
                    return;
                }
                match self.list_dir(credential, repo, &dir).await {
                    Ok(children) => stack.extend(children.into_iter().rev().map(|e| (e, depth + 1))),
                    Err(e) => {
                        yield Err(e);
                        return;
                    },
                }
            }
        })
    }
}
