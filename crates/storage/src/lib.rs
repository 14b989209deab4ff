//! Remote content adapters.
//!
//! File bytes live in a git hosting backend; this crate is the only place
//! that talks to it. Backends implement [`RemoteBackend`]: create an object
//! at a path (never overwriting), delete an object (tolerating absence),
//! list a directory, and confirm a repository/branch is reachable.

pub mod backend;
pub mod error;
mod models;
mod path;

pub use crate::backend::RemoteBackend;
pub use crate::models::{Credential, DeleteOutcome, RemoteEntry, RemoteFile, RepoRef, WalkLimits};
pub use crate::path::{file_name, validate as validate_path, validate_dir};
use std::sync::Arc;

pub type BackendHandle = Arc<dyn RemoteBackend + Send + Sync>;
