//! In-memory remote backend for testing.

use crate::error::{ErrorKind, Result};
use crate::models::{Credential, DeleteOutcome, RemoteEntry, RemoteFile, RepoRef};
use crate::path::{file_name, validate as validate_path, validate_dir};
use crate::RemoteBackend;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, RwLock};

/// Backend operation, for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Validate,
    Upload,
    Delete,
    ListDir,
}

#[derive(Default)]
struct Calls {
    validate: AtomicUsize,
    upload: AtomicUsize,
    delete: AtomicUsize,
    list_dir: AtomicUsize,
}

impl Calls {
    fn counter(&self, operation: Operation) -> &AtomicUsize {
        match operation {
            Operation::Validate => &self.validate,
            Operation::Upload => &self.upload,
            Operation::Delete => &self.delete,
            Operation::ListDir => &self.list_dir,
        }
    }
}

/// In-memory remote backend for testing.
///
/// Objects are stored per repository (`owner/name`) in a map behind a
/// [`RwLock`]. Every call is counted, and a single failure can be queued
/// per operation with [`MockBackend::fail_next`].
///
/// An empty credential is always rejected with
/// [`PermissionDenied`](ErrorKind::PermissionDenied). When the backend was
/// built with [`MockBackend::with_repositories`], any other repository is
/// [`NotAccessible`](ErrorKind::NotAccessible).
///
/// # Examples
///
/// ```
/// use gitshelf_storage::backend::{MockBackend, Operation, RemoteBackend};
/// use gitshelf_storage::{Credential, RepoRef};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::default().with_files("octo/pictures", [("files/a.txt", "hello")]);
/// let repo = RepoRef::parse("https://github.com/octo/pictures", "master")?;
/// let credential = Credential::new("token");
///
/// backend.upload(&credential, &repo, "files/b.txt", b"world", "Upload file: b.txt").await?;
/// assert_eq!(backend.calls(Operation::Upload), 1);
/// assert_eq!(backend.contents(&repo, "files/b.txt").await.as_deref(), Some(&b"world"[..]));
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    storage: RwLock<HashMap<String, BTreeMap<String, Vec<u8>>>>,
    repositories: Option<HashSet<String>>,
    failures: Mutex<HashMap<Operation, ErrorKind>>,
    calls: Calls,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(HashMap::new()),
            repositories: None,
            failures: Mutex::new(HashMap::new()),
            calls: Calls::default(),
        }
    }
}

impl MockBackend {
    /// Pre-populate a repository with files.
    ///
    /// Panics if any path fails validation. If test setup is wrong, then the
    /// test should not pass.
    pub fn with_files(
        mut self,
        repository: impl Into<String>,
        files: impl IntoIterator<Item = (impl Into<String>, impl Into<Vec<u8>>)>,
    ) -> Self {
        let tree = self.storage.get_mut().entry(repository.into()).or_default();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                panic!("MockBackend::with_files: invalid path {path}");
            };
            tree.insert(validated, data.into());
        }
        self
    }

    /// Restrict the backend to the named repositories (`owner/name`).
    pub fn with_repositories(mut self, repositories: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.repositories = Some(repositories.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Make the next call of `operation` fail with `kind`.
    pub async fn fail_next(&self, operation: Operation, kind: ErrorKind) {
        self.failures.lock().await.insert(operation, kind);
    }

    /// Number of times `operation` has been called, failed calls included.
    pub fn calls(&self, operation: Operation) -> usize {
        self.calls.counter(operation).load(Ordering::SeqCst)
    }

    /// Bytes stored at `path`, if any.
    pub async fn contents(&self, repo: &RepoRef, path: &str) -> Option<Vec<u8>> {
        let guard = self.storage.read().await;
        guard.get(&repo.full_name())?.get(path).cloned()
    }

    /// All stored paths of a repository, sorted.
    pub async fn paths(&self, repo: &RepoRef) -> Vec<String> {
        let guard = self.storage.read().await;
        guard.get(&repo.full_name()).map(|tree| tree.keys().cloned().collect()).unwrap_or_default()
    }

    async fn enter(&self, operation: Operation, credential: &Credential, repo: &RepoRef) -> Result<()> {
        self.calls.counter(operation).fetch_add(1, Ordering::SeqCst);
        if let Some(kind) = self.failures.lock().await.remove(&operation) {
            exn::bail!(kind);
        }
        if credential.is_empty() {
            exn::bail!(ErrorKind::PermissionDenied(repo.full_name()));
        }
        if let Some(allowed) = &self.repositories
            && !allowed.contains(&repo.full_name())
        {
            exn::bail!(ErrorKind::NotAccessible(repo.full_name()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn validate(&self, credential: &Credential, repo: &RepoRef) -> Result<()> {
        self.enter(Operation::Validate, credential, repo).await
    }

    async fn upload(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        path: &str,
        content: &[u8],
        _message: &str,
    ) -> Result<()> {
        self.enter(Operation::Upload, credential, repo).await?;
        let path = validate_path(path)?;
        let mut guard = self.storage.write().await;
        let tree = guard.entry(repo.full_name()).or_default();
        if tree.contains_key(&path) {
            exn::bail!(ErrorKind::AlreadyExists(path));
        }
        tree.insert(path, content.to_vec());
        Ok(())
    }

    async fn delete(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        path: &str,
        _message: &str,
    ) -> Result<DeleteOutcome> {
        self.enter(Operation::Delete, credential, repo).await?;
        let path = validate_path(path)?;
        let mut guard = self.storage.write().await;
        let removed = guard.get_mut(&repo.full_name()).and_then(|tree| tree.remove(&path));
        Ok(match removed {
            Some(_) => DeleteOutcome::Removed,
            None => DeleteOutcome::AlreadyAbsent,
        })
    }

    async fn list_dir(&self, credential: &Credential, repo: &RepoRef, dir: &str) -> Result<Vec<RemoteEntry>> {
        self.enter(Operation::ListDir, credential, repo).await?;
        let dir = validate_dir(dir)?;
        let prefix = match dir.is_empty() {
            true => String::new(),
            false => format!("{dir}/"),
        };
        let guard = self.storage.read().await;
        let Some(tree) = guard.get(&repo.full_name()) else {
            return Ok(Vec::new());
        };
        // Directories are implied by the paths below them.
        let mut entries: BTreeMap<String, RemoteEntry> = BTreeMap::new();
        for (path, data) in tree.range(prefix.clone()..) {
            let Some(rest) = path.strip_prefix(&prefix) else { break };
            match rest.split_once('/') {
                Some((child, _)) => {
                    let child_path = format!("{prefix}{child}");
                    entries.entry(child.to_string()).or_insert_with(|| RemoteEntry::Dir {
                        name: child.to_string(),
                        path: child_path,
                    });
                },
                None => {
                    entries.insert(
                        rest.to_string(),
                        RemoteEntry::File(RemoteFile {
                            name: file_name(path).to_string(),
                            path: path.clone(),
                            size: data.len() as u64,
                            sha: gitshelf_hash::compute_bytes(data),
                            download_url: Some(format!("mock://{}/{}/{path}", repo.full_name(), repo.branch)),
                        }),
                    );
                },
            }
        }
        if entries.is_empty() && !dir.is_empty() {
            exn::bail!(ErrorKind::NotFound(dir));
        }
        Ok(entries.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WalkLimits;
    use futures::TryStreamExt;

    fn repo() -> RepoRef {
        RepoRef::parse("https://github.com/octo/pictures", "master").unwrap()
    }

    fn token() -> Credential {
        Credential::new("token")
    }

    #[tokio::test]
    async fn test_upload_never_overwrites() {
        let backend = MockBackend::default();
        backend.upload(&token(), &repo(), "files/a.txt", b"one", "m").await.unwrap();
        let err = backend.upload(&token(), &repo(), "files/a.txt", b"two", "m").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::AlreadyExists(_)));
        assert_eq!(backend.contents(&repo(), "files/a.txt").await.unwrap(), b"one");
        assert_eq!(backend.calls(Operation::Upload), 2);
    }

    #[tokio::test]
    async fn test_delete_missing_is_already_absent() {
        let backend = MockBackend::default().with_files("octo/pictures", [("a.txt", "x")]);
        assert_eq!(backend.delete(&token(), &repo(), "a.txt", "m").await.unwrap(), DeleteOutcome::Removed);
        assert_eq!(backend.delete(&token(), &repo(), "a.txt", "m").await.unwrap(), DeleteOutcome::AlreadyAbsent);
    }

    #[tokio::test]
    async fn test_empty_credential_rejected() {
        let backend = MockBackend::default();
        let err = backend.validate(&Credential::new(""), &repo()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_unknown_repository_not_accessible() {
        let backend = MockBackend::default().with_repositories(["octo/other"]);
        let err = backend.validate(&token(), &repo()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotAccessible(_)));
    }

    #[tokio::test]
    async fn test_fail_next_is_one_shot() {
        let backend = MockBackend::default();
        backend.fail_next(Operation::Upload, ErrorKind::Network("reset".into())).await;
        let err = backend.upload(&token(), &repo(), "a.txt", b"x", "m").await.unwrap_err();
        assert!(err.is_retryable());
        backend.upload(&token(), &repo(), "a.txt", b"x", "m").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_dir_synthesizes_directories() {
        let backend = MockBackend::default().with_files(
            "octo/pictures",
            [("files/ab/abc.txt", "hello world\n"), ("files/cd/cde.png", "png"), ("readme.md", "hi")],
        );
        let root = backend.list_dir(&token(), &repo(), "").await.unwrap();
        let paths: Vec<_> = root.iter().map(RemoteEntry::path).collect();
        assert_eq!(paths, ["files", "readme.md"]);

        let nested = backend.list_dir(&token(), &repo(), "files/ab").await.unwrap();
        let RemoteEntry::File(file) = &nested[0] else { panic!("expected a file") };
        assert_eq!(file.name, "abc.txt");
        assert_eq!(file.size, 12);
        assert_eq!(file.sha, "3b18e512dba79e4c8300dd08aeb37f8e728b8dad");

        let err = backend.list_dir(&token(), &repo(), "nope").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_walk_is_depth_first() {
        let backend = MockBackend::default().with_files(
            "octo/pictures",
            [("a/b/c.txt", "1"), ("a/d.txt", "2"), ("e.txt", "3")],
        );
        let entries: Vec<_> = backend.walk(&token(), &repo(), WalkLimits::default()).try_collect().await.unwrap();
        let paths: Vec<_> = entries.iter().map(RemoteEntry::path).collect();
        assert_eq!(paths, ["a", "a/b", "a/b/c.txt", "a/d.txt", "e.txt"]);
    }

    #[tokio::test]
    async fn test_walk_depth_limit() {
        let backend = MockBackend::default().with_files("octo/pictures", [("a/b/c/d.txt", "1")]);
        let limits = WalkLimits { max_depth: 2, max_entries: 100 };
        let err = backend.walk(&token(), &repo(), limits).try_collect::<Vec<_>>().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::TreeTooLarge(_)));
    }

    #[tokio::test]
    async fn test_walk_entry_limit() {
        let backend = MockBackend::default().with_files("octo/pictures", [("1.txt", "1"), ("2.txt", "2"), ("3.txt", "3")]);
        let limits = WalkLimits { max_depth: 2, max_entries: 2 };
        let err = backend.walk(&token(), &repo(), limits).try_collect::<Vec<_>>().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::TreeTooLarge(_)));
    }
}
