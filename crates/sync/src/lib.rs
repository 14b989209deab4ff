//! Content-addressed synchronisation between the local file index and git
//! repositories.
//!
//! Three write paths touch the index:
//! - client uploads and deletes ([`upload`], [`upload_stream`], [`delete`]),
//! - bulk import when a repository is first linked ([`import`]),
//! - push notifications from the hosting backend ([`webhook::handle`]).
//!
//! All of them take a [`Context`], which owns every collaborator (index
//! stores, remote backend, credential cache, settings). There is no global
//! state: tests build a context around an in-memory database and a mock
//! backend.

mod credentials;
mod delete;
pub mod error;
mod import;
mod listing;
mod repository;
mod upload;
pub mod webhook;

pub use crate::credentials::{Credentials, MemoryTokenCache, TokenCache};
pub use crate::delete::delete;
pub use crate::import::{ImportSummary, import};
pub use crate::listing::{FileView, cdn_host, list, set_cdn_host};
pub use crate::repository::{initialize, link, repo_ref, unlink, update};
pub use crate::upload::{UploadRequest, Uploaded, upload, upload_stream};

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use gitshelf_asyncutils::KeyedLocks;
use gitshelf_config::Settings;
use gitshelf_index::{ConfigStore, Database, FileIndex, RepositoryStore};
use gitshelf_storage::BackendHandle;
use gitshelf_storage::backend::{CommitAuthor, GithubBackend};
use std::sync::Arc;

/// Everything a sync operation needs, constructed once per process and
/// shared (cheaply cloned) between request handlers.
#[derive(Clone)]
pub struct Context {
    pub files: FileIndex,
    pub repositories: RepositoryStore,
    pub config: ConfigStore,
    pub backend: BackendHandle,
    pub credentials: Credentials,
    pub settings: Arc<Settings>,
    /// Serialises uploads of the same content into the same repository.
    pub(crate) upload_locks: KeyedLocks<(i64, String)>,
}

impl Context {
    /// Build a context with an in-memory credential cache.
    pub fn new(db: &Database, backend: BackendHandle, settings: Settings) -> Self {
        let cache = Arc::new(MemoryTokenCache::default());
        Self::with_token_cache(db, backend, settings, cache)
    }

    pub fn with_token_cache(
        db: &Database,
        backend: BackendHandle,
        settings: Settings,
        cache: Arc<dyn TokenCache + Send + Sync>,
    ) -> Self {
        let credentials = Credentials::new(db.config(), cache, settings.credentials.ttl());
        Self {
            files: db.files(),
            repositories: db.repositories(),
            config: db.config(),
            backend,
            credentials,
            settings: Arc::new(settings),
            upload_locks: KeyedLocks::default(),
        }
    }

    /// Open the configured database and talk to the configured GitHub API.
    pub async fn connect(settings: Settings) -> Result<(Self, Database)> {
        let db = Database::connect(&settings.database).await.or_raise(|| ErrorKind::Index)?;
        let author = settings
            .remote
            .commit_author
            .as_ref()
            .map(|a| CommitAuthor { name: a.name.clone(), email: a.email.clone() });
        let backend = GithubBackend::new("github", &settings.remote.api_base, settings.remote.timeout())
            .or_raise(|| ErrorKind::RemoteUnavailable { operation: "connect" })?
            .with_author(author);
        let ctx = Self::new(&db, Arc::new(backend), settings);
        tracing::info!(backend = ctx.backend.name(), database = %ctx.settings.database.display(), "sync context ready");
        Ok((ctx, db))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for the engine tests.

    use super::*;
    use gitshelf_index::{NewRepository, Repository};
    use gitshelf_storage::backend::MockBackend;

    pub const OWNER: i64 = 1;
    pub const REPO_URL: &str = "https://github.com/octo/pictures";

    pub struct Harness {
        pub ctx: Context,
        pub backend: Arc<MockBackend>,
        pub db: Database,
    }

    impl Harness {
        pub async fn new(backend: MockBackend) -> Self {
            Self::with_settings(backend, Settings::default()).await
        }

        pub async fn with_settings(backend: MockBackend, settings: Settings) -> Self {
            let db = Database::connect_in_memory().await.unwrap();
            let backend = Arc::new(backend);
            let ctx = Context::new(&db, backend.clone(), settings);
            Self { ctx, backend, db }
        }

        /// A repository for [`OWNER`] with a configured credential.
        pub async fn linked(&self) -> Repository {
            self.ctx.credentials.set(OWNER, "token").await.unwrap();
            self.ctx
                .repositories
                .insert(&NewRepository {
                    owner_id: OWNER,
                    display_name: "octo/pictures".to_string(),
                    url: REPO_URL.to_string(),
                    branch: "master".to_string(),
                })
                .await
                .unwrap()
        }
    }
}
