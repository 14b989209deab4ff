use crate::Context;
use crate::error::{self, ErrorKind, Result};
use crate::repository::repo_ref;
use exn::ResultExt;
use gitshelf_index::FileRecord;
use gitshelf_storage::DeleteOutcome;
use gitshelf_storage::error::ErrorKind as StorageErrorKind;
use std::ops::Deref;
use tracing::instrument;

async fn owned_file(ctx: &Context, id: i64, owner_id: i64) -> Result<FileRecord> {
    match ctx.files.get(id).await.or_raise(|| ErrorKind::Index)? {
        None => exn::bail!(ErrorKind::NotFound(format!("file {id}"))),
        Some(record) if record.owner_id != owner_id => exn::bail!(ErrorKind::Permission(format!("file {id}"))),
        Some(record) => Ok(record),
    }
}

/// Delete a file from the remote repository, then forget it.
///
/// The remote object being gone already counts as success. Any other remote
/// failure leaves the record in place.
#[instrument(skip(ctx))]
pub async fn delete(ctx: &Context, id: i64, owner_id: i64) -> Result<()> {
    let record = owned_file(ctx, id, owner_id).await?;
    let repository = ctx
        .repositories
        .get(record.repo_id)
        .await
        .or_raise(|| ErrorKind::Index)?
        .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(format!("repository {}", record.repo_id))))?;
    let credential = ctx.credentials.get(owner_id).await?;
    let repo = repo_ref(&repository)?;
    let message = format!("Delete file: {}", record.original_filename);
    match ctx.backend.delete(&credential, &repo, &record.remote_path, &message).await {
        Ok(DeleteOutcome::Removed) => (),
        Ok(DeleteOutcome::AlreadyAbsent) => {
            tracing::debug!(path = %record.remote_path, "remote object already absent");
        },
        Err(e) if matches!(e.deref(), StorageErrorKind::NotFound(_)) => {
            tracing::debug!(path = %record.remote_path, "remote object already absent");
        },
        Err(e) => return Err(error::remote(e, "delete")),
    }
    ctx.files.delete(record.id, owner_id).await.or_raise(|| ErrorKind::Index)?;
    tracing::info!(id, path = %record.remote_path, "file deleted");
    Ok(())
}
