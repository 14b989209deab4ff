//! Linking repositories to owners.

use crate::Context;
use crate::error::{self, ErrorKind, Result};
use crate::import::{ImportSummary, import};
use exn::ResultExt;
use gitshelf_index::error::ErrorKind as IndexErrorKind;
use gitshelf_index::{NewRepository, Repository};
use gitshelf_storage::RepoRef;
use std::ops::Deref;
use tracing::instrument;

/// Canonical form of a repository URL, so the same remote is not linked
/// twice under cosmetically different spellings.
fn normalize_url(url: &str) -> Result<String> {
    let url = url.trim().trim_end_matches('/');
    let url = url.strip_suffix(".git").unwrap_or(url);
    if url.is_empty() {
        exn::bail!(ErrorKind::Validation("repository URL must not be empty".to_string()));
    }
    Ok(url.to_string())
}

fn branch_or_default<'a>(ctx: &'a Context, branch: Option<&'a str>) -> &'a str {
    branch.map(str::trim).filter(|b| !b.is_empty()).unwrap_or(&ctx.settings.remote.default_branch)
}

/// Remote coordinates of a linked repository.
pub fn repo_ref(repository: &Repository) -> Result<RepoRef> {
    RepoRef::parse(&repository.url, repository.branch.clone()).map_err(|e| error::remote(e, "resolve"))
}

/// Fetch a repository on behalf of `owner_id`, telling "missing" apart from
/// "someone else's".
pub(crate) async fn owned(ctx: &Context, id: i64, owner_id: i64) -> Result<Repository> {
    match ctx.repositories.get(id).await.or_raise(|| ErrorKind::Index)? {
        None => exn::bail!(ErrorKind::NotFound(format!("repository {id}"))),
        Some(repository) if repository.owner_id != owner_id => {
            exn::bail!(ErrorKind::Permission(format!("repository {id}")))
        },
        Some(repository) => Ok(repository),
    }
}

async fn validate_remote(ctx: &Context, owner_id: i64, url: &str, branch: &str) -> Result<RepoRef> {
    let credential = ctx.credentials.get(owner_id).await?;
    let repo = RepoRef::parse(url, branch).map_err(|e| error::remote(e, "validate"))?;
    ctx.backend.validate(&credential, &repo).await.map_err(|e| error::remote(e, "validate"))?;
    Ok(repo)
}

/// Link a remote repository to `owner_id`.
///
/// Linking the same URL twice returns the existing record. Otherwise the
/// owner's credential must be configured and must be able to see the
/// repository and branch; nothing is persisted if it cannot.
#[instrument(skip(ctx))]
pub async fn link(
    ctx: &Context,
    owner_id: i64,
    display_name: Option<&str>,
    url: &str,
    branch: Option<&str>,
) -> Result<Repository> {
    let url = normalize_url(url)?;
    if let Some(existing) = ctx.repositories.find_by_url(owner_id, &url).await.or_raise(|| ErrorKind::Index)? {
        tracing::debug!(id = existing.id, "repository already linked");
        return Ok(existing);
    }
    let branch = branch_or_default(ctx, branch);
    let repo = validate_remote(ctx, owner_id, &url, branch).await?;
    let record = NewRepository {
        owner_id,
        display_name: display_name.map(str::trim).filter(|n| !n.is_empty()).map_or_else(|| repo.full_name(), str::to_string),
        url: url.clone(),
        branch: branch.to_string(),
    };
    match ctx.repositories.insert(&record).await {
        Ok(repository) => {
            tracing::info!(id = repository.id, repository = %repo.full_name(), "repository linked");
            Ok(repository)
        },
        // Lost a race against a concurrent link of the same URL.
        Err(e) if matches!(e.deref(), IndexErrorKind::Conflict(_)) => ctx
            .repositories
            .find_by_url(owner_id, &url)
            .await
            .or_raise(|| ErrorKind::Index)?
            .ok_or_else(|| e.raise(ErrorKind::Index)),
        Err(e) => Err(e.raise(ErrorKind::Index)),
    }
}

/// Change an owned repository's display name, URL or branch.
///
/// A changed URL or branch is validated against the remote again before
/// anything is written.
#[instrument(skip(ctx))]
pub async fn update(
    ctx: &Context,
    id: i64,
    owner_id: i64,
    display_name: Option<&str>,
    url: &str,
    branch: Option<&str>,
) -> Result<Repository> {
    let current = owned(ctx, id, owner_id).await?;
    let url = normalize_url(url)?;
    let branch = branch_or_default(ctx, branch);
    let display_name = match display_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None if url == current.url => current.display_name.clone(),
        None => RepoRef::parse(&url, branch).map_err(|e| error::remote(e, "validate"))?.full_name(),
    };
    if url != current.url || branch != current.branch {
        validate_remote(ctx, owner_id, &url, branch).await?;
    }
    let changes = NewRepository { owner_id, display_name, url, branch: branch.to_string() };
    match ctx.repositories.update(id, owner_id, &changes).await {
        Ok(Some(repository)) => Ok(repository),
        Ok(None) => exn::bail!(ErrorKind::NotFound(format!("repository {id}"))),
        Err(e) if matches!(e.deref(), IndexErrorKind::Conflict(_)) => {
            Err(e.raise(ErrorKind::Validation(format!("{} is already linked", changes.url))))
        },
        Err(e) => Err(e.raise(ErrorKind::Index)),
    }
}

/// Unlink an owned repository, dropping all of its file records. The remote
/// repository itself is left untouched.
#[instrument(skip(ctx))]
pub async fn unlink(ctx: &Context, id: i64, owner_id: i64) -> Result<()> {
    owned(ctx, id, owner_id).await?;
    if !ctx.repositories.delete(id, owner_id).await.or_raise(|| ErrorKind::Index)? {
        exn::bail!(ErrorKind::NotFound(format!("repository {id}")));
    }
    tracing::info!(id, "repository unlinked");
    Ok(())
}

/// Seed the index of an owned repository from its remote tree.
#[instrument(skip(ctx))]
pub async fn initialize(ctx: &Context, id: i64, owner_id: i64) -> Result<ImportSummary> {
    let repository = owned(ctx, id, owner_id).await?;
    import(ctx, &repository).await
}
