//! SQLite index of file metadata.
//!
//! The index is a cache of truth about the remote repositories: the bytes
//! live remotely, and the index records what is stored where so listings and
//! deduplication never have to ask the remote backend.
//!
//! # Architecture
//! - **Repositories**: remote locations linked by a user. Deleting one
//!   deletes its file records.
//! - **File records**: one stored object each, looked up by
//!   `(repository, content hash)` for deduplication and by
//!   `(repository, remote path)` or filename for reconciliation.
//! - **Config**: per-user tagged values (credentials, CDN host).

mod config;
mod db;
pub mod error;
mod files;
mod models;
mod page;
mod repositories;

pub use crate::config::ConfigStore;
pub use crate::db::Database;
pub use crate::files::{FileIndex, Reconciliation};
pub use crate::models::{ConfigValue, FileRecord, NewFileRecord, NewRepository, RemoteUpdate, Repository};
pub use crate::page::{Page, Paginated};
pub use crate::repositories::RepositoryStore;
