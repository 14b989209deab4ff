//! Process-wide settings.
//!
//! Settings are layered, later layers overriding earlier ones:
//! 1. built-in defaults,
//! 2. an optional config file (TOML, YAML or JSON, picked by extension),
//! 3. `GITSHELF_*` environment variables, with `__` separating nested keys
//!    (`GITSHELF_STORAGE__ROOT=blobs` sets `storage.root`).
//!
//! Per-user values such as remote credentials are not settings; they live in
//! the index's config table.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::instrument;

pub const ENV_PREFIX: &str = "GITSHELF_";
const DEFAULT_CONFIG_FILE: &str = "config.toml";
const DEFAULT_DATABASE_FILE: &str = "index.sqlite";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "gitshelf")
}

/// Where the config file is looked for when none is given explicitly.
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(DEFAULT_CONFIG_FILE))
}

fn default_database_path() -> PathBuf {
    match project_dirs() {
        Some(dirs) => dirs.data_dir().join(DEFAULT_DATABASE_FILE),
        None => PathBuf::from(DEFAULT_DATABASE_FILE),
    }
}

/// A secret that never shows up in `Debug` output or logs.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.is_empty() {
            true => f.write_str("Secret(<unset>)"),
            false => f.write_str("Secret(***)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory inside each repository that uploads are written to, and the
    /// only subtree push notifications are indexed from.
    pub root: String,
    /// Largest accepted upload, in bytes.
    pub max_upload_bytes: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root: "files".to_string(),
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitAuthorSettings {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    pub api_base: String,
    pub timeout_secs: u64,
    /// Branch used when a repository is linked without one.
    pub default_branch: String,
    pub commit_author: Option<CommitAuthorSettings>,
}

impl RemoteSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            timeout_secs: 30,
            default_branch: "master".to_string(),
            commit_author: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialSettings {
    /// How long a credential stays in the in-memory cache.
    pub ttl_secs: u64,
}

impl CredentialSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self { ttl_secs: 3600 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookSettings {
    /// Shared secret for `X-Hub-Signature-256` verification.
    pub secret: Secret,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CdnSettings {
    /// Fallback CDN host for users that have not configured their own.
    pub host: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingSettings {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for ListingSettings {
    fn default() -> Self {
        Self {
            default_page_size: 10,
            max_page_size: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    pub max_depth: usize,
    pub max_entries: usize,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            max_depth: 32,
            max_entries: 100_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Path of the SQLite index.
    pub database: PathBuf,
    pub storage: StorageSettings,
    pub remote: RemoteSettings,
    pub credentials: CredentialSettings,
    pub webhook: WebhookSettings,
    pub cdn: CdnSettings,
    pub listing: ListingSettings,
    pub import: ImportSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: default_database_path(),
            storage: StorageSettings::default(),
            remote: RemoteSettings::default(),
            credentials: CredentialSettings::default(),
            webhook: WebhookSettings::default(),
            cdn: CdnSettings::default(),
            listing: ListingSettings::default(),
            import: ImportSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from defaults, a config file and the environment.
    ///
    /// An explicit `path` must exist. Without one, the default location is
    /// used if (and only if) a file is there.
    #[instrument]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => default_config_path().filter(|p| p.is_file()),
        };
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = &file {
            tracing::debug!(path = %file.display(), "loading config file");
            figment = merge_file(figment, file)?;
        }
        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Extract and validate settings from an already-assembled figment.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let settings: Self = figment.extract().or_raise(|| ErrorKind::Parse)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        let root = self.storage.root.trim_matches('/');
        if root.is_empty() || root.split('/').any(|s| s.is_empty() || s == "." || s == "..") {
            exn::bail!(ErrorKind::Invalid("storage.root", self.storage.root.clone()));
        }
        if self.listing.max_page_size == 0 {
            exn::bail!(ErrorKind::Invalid("listing.max_page_size", "must be at least 1".to_string()));
        }
        if self.listing.default_page_size == 0 || self.listing.default_page_size > self.listing.max_page_size {
            exn::bail!(ErrorKind::Invalid(
                "listing.default_page_size",
                format!("must be between 1 and {}", self.listing.max_page_size)
            ));
        }
        if self.remote.timeout_secs == 0 {
            exn::bail!(ErrorKind::Invalid("remote.timeout_secs", "must be at least 1".to_string()));
        }
        if self.remote.default_branch.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("remote.default_branch", "must not be empty".to_string()));
        }
        Ok(())
    }

    /// `storage.root` without leading or trailing slashes.
    pub fn storage_root(&self) -> &str {
        self.storage.root.trim_matches('/')
    }
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    Ok(match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file_exact(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path)),
        Some("json") => figment.merge(Json::file_exact(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    })
}
