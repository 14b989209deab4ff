//! Seeding the index from an existing remote tree.

use crate::Context;
use crate::error::{self, ErrorKind, Result};
use crate::repository::repo_ref;
use exn::ResultExt;
use futures::TryStreamExt;
use gitshelf_detect::classify_name;
use gitshelf_index::{NewFileRecord, RemoteUpdate, Repository};
use gitshelf_storage::{RemoteEntry, RemoteFile, WalkLimits};
use std::collections::HashSet;
use tracing::instrument;

/// What an import did to the index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub created: u64,
    pub updated: u64,
    pub directories: u64,
}

/// Walk the whole remote tree of `repository` and make the index agree with
/// it, file by file.
///
/// Files are matched on their exact remote path first. Whatever is left is
/// matched on its name against records that no walked path claimed, which
/// picks up objects moved within the repository without ever taking over a
/// record whose object is still in place. A match has its hash, size, type
/// and path overwritten (and its dimensions cleared, since nothing is
/// downloaded). Anything unmatched is created. The first failure aborts the
/// import. Records already written stay, and running the import again picks
/// up where it stopped.
#[instrument(skip(ctx, repository), fields(repository = repository.id))]
pub async fn import(ctx: &Context, repository: &Repository) -> Result<ImportSummary> {
    let credential = ctx.credentials.get(repository.owner_id).await?;
    let repo = repo_ref(repository)?;
    let limits = WalkLimits {
        max_depth: ctx.settings.import.max_depth,
        max_entries: ctx.settings.import.max_entries,
    };
    let mut summary = ImportSummary::default();
    let mut claimed = HashSet::new();
    let mut unmatched = Vec::new();
    let mut walk = ctx.backend.walk(&credential, &repo, limits);
    while let Some(entry) = walk.try_next().await.map_err(|e| error::remote(e, "import"))? {
        match entry {
            RemoteEntry::Dir { .. } => summary.directories += 1,
            RemoteEntry::File(file) => {
                match ctx.files.find_by_path(repository.id, &file.path).await.or_raise(|| ErrorKind::Index)? {
                    Some(record) => {
                        claimed.insert(record.id);
                        update(ctx, record.id, file).await?;
                        summary.updated += 1;
                    },
                    None => unmatched.push(file),
                }
            },
        }
    }
    for file in unmatched {
        let moved = ctx
            .files
            .find_by_filename(repository.id, repository.owner_id, &file.name)
            .await
            .or_raise(|| ErrorKind::Index)?
            .into_iter()
            .find(|record| !claimed.contains(&record.id));
        match moved {
            Some(record) => {
                claimed.insert(record.id);
                update(ctx, record.id, file).await?;
                summary.updated += 1;
            },
            None => {
                create(ctx, repository, file).await?;
                summary.created += 1;
            },
        }
    }
    tracing::info!(created = summary.created, updated = summary.updated, "import finished");
    Ok(summary)
}

async fn update(ctx: &Context, id: i64, file: RemoteFile) -> Result<()> {
    let classification = classify_name(&file.name);
    let update = RemoteUpdate {
        content_hash: file.sha,
        remote_path: file.path.clone(),
        display_name: file.path,
        size: file.size,
        mime: classification.mime,
        file_type: classification.file_type,
    };
    ctx.files.update_from_remote(id, &update).await.map_err(error::index)?;
    tracing::debug!(id, path = %update.remote_path, "updated from remote");
    Ok(())
}

async fn create(ctx: &Context, repository: &Repository, file: RemoteFile) -> Result<()> {
    let classification = classify_name(&file.name);
    let record = ctx
        .files
        .insert(&NewFileRecord {
            repo_id: repository.id,
            owner_id: repository.owner_id,
            content_hash: Some(file.sha),
            remote_path: file.path.clone(),
            display_name: file.path,
            original_filename: file.name,
            size: file.size,
            mime: classification.mime,
            file_type: classification.file_type,
            width: None,
            height: None,
        })
        .await
        .map_err(error::index)?;
    tracing::debug!(id = record.id, path = %record.remote_path, "imported from remote");
    Ok(())
}
