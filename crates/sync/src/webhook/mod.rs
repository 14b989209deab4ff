//! Reconciling the index with pushes reported by the hosting backend.
//!
//! A delivery goes through a fixed sequence of gates:
//! 1. the signature must match the raw body, or it is rejected;
//! 2. anything but a `push` event is ignored;
//! 3. the repository is resolved by its `owner/name`; an unknown repository
//!    fails the delivery, unless the ref is no branch any linked repository
//!    tracks, in which case it is ignored;
//! 4. pushes to any branch but the repository's own are ignored;
//! 5. every commit's added, removed and modified paths are applied in order
//!    inside one transaction.

mod payload;
mod signature;

pub use self::payload::{PushCommit, PushEvent, PushRepository};
pub use self::signature::{sign, verify};

use crate::Context;
use crate::error::{self, ErrorKind, Result};
use derive_more::Display;
use exn::ResultExt;
use gitshelf_detect::classify_name;
use gitshelf_index::{NewFileRecord, Reconciliation, Repository};
use gitshelf_storage::{file_name, validate_path};
use tracing::instrument;

pub const EVENT_HEADER: &str = "X-GitHub-Event";
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

/// Why a verified delivery was not applied.
#[derive(Debug, Clone, Display, PartialEq, Eq)]
pub enum Ignored {
    #[display("event {_0:?} is not a push")]
    Event(String),
    #[display("ref {_0:?} is not the repository branch")]
    Ref(String),
}

/// Rows touched by an applied push.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Applied {
    pub repository: i64,
    pub added: u64,
    pub removed: u64,
    pub modified: u64,
    /// Paths outside the storage root, or not valid paths at all.
    pub skipped: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Ignored(Ignored),
    Applied(Applied),
}

/// Verify and apply one webhook delivery.
///
/// `event` and `signature` are the raw `X-GitHub-Event` and
/// `X-Hub-Signature-256` header values. An ignored delivery is a success.
#[instrument(skip(ctx, signature, body), fields(size = body.len()))]
pub async fn handle(ctx: &Context, event: Option<&str>, signature: Option<&str>, body: &[u8]) -> Result<WebhookOutcome> {
    verify(ctx.settings.webhook.secret.expose().as_bytes(), body, signature)?;

    let event = event.unwrap_or_default().trim();
    if event != "push" {
        tracing::debug!(event, "ignoring webhook event");
        return Ok(WebhookOutcome::Ignored(Ignored::Event(event.to_string())));
    }
    let push: PushEvent =
        serde_json::from_slice(body).or_raise(|| ErrorKind::Validation("invalid push payload".to_string()))?;

    let full_name = &push.repository.full_name;
    let Some(repository) = ctx.repositories.find_by_full_name(full_name).await.or_raise(|| ErrorKind::Index)? else {
        let tracked = match push.branch() {
            Some(branch) => ctx.repositories.tracks_branch(branch).await.or_raise(|| ErrorKind::Index)?,
            None => false,
        };
        if !tracked {
            tracing::debug!(git_ref = %push.git_ref, repository = %full_name, "ignoring push to an untracked ref");
            return Ok(WebhookOutcome::Ignored(Ignored::Ref(push.git_ref)));
        }
        exn::bail!(ErrorKind::NotFound(format!("repository {full_name}")));
    };
    if push.branch() != Some(repository.branch.as_str()) {
        tracing::debug!(git_ref = %push.git_ref, branch = %repository.branch, "ignoring push to another ref");
        return Ok(WebhookOutcome::Ignored(Ignored::Ref(push.git_ref)));
    }

    let applied = reconcile(ctx, &repository, &push.commits).await?;
    tracing::info!(
        repository = repository.id,
        added = applied.added,
        removed = applied.removed,
        modified = applied.modified,
        skipped = applied.skipped,
        "push reconciled"
    );
    Ok(WebhookOutcome::Applied(applied))
}

/// Apply commits in order. Nothing is committed unless every step succeeds.
async fn reconcile(ctx: &Context, repository: &Repository, commits: &[PushCommit]) -> Result<Applied> {
    let root = format!("{}/", ctx.settings.storage_root());
    // Paths the reconciler owns, normalised. Anything else is left alone.
    let tracked = |path: &str| validate_path(path).ok().filter(|p| p.starts_with(&root));

    let mut applied = Applied { repository: repository.id, ..Applied::default() };
    let mut tx = ctx.files.begin_reconciliation().await.or_raise(|| ErrorKind::Index)?;
    for commit in commits {
        for path in &commit.added {
            let Some(path) = tracked(path) else {
                applied.skipped += 1;
                continue;
            };
            if add(&mut tx, repository, path).await? {
                applied.added += 1;
            }
        }
        for path in &commit.removed {
            let Some(path) = tracked(path) else {
                applied.skipped += 1;
                continue;
            };
            applied.removed += tx.remove_by_filename(repository.id, file_name(&path)).await.map_err(error::index)?;
        }
        for path in &commit.modified {
            let Some(path) = tracked(path) else {
                applied.skipped += 1;
                continue;
            };
            applied.modified +=
                tx.relocate_by_filename(repository.id, file_name(&path), &path).await.map_err(error::index)?;
        }
    }
    tx.commit().await.or_raise(|| ErrorKind::Index)?;
    Ok(applied)
}

/// Record a pushed object. Hash and size stay unknown until the object is
/// imported; an existing record at the same path is kept as it is.
async fn add(tx: &mut Reconciliation, repository: &Repository, path: String) -> Result<bool> {
    let filename = file_name(&path).to_string();
    let classification = classify_name(&filename);
    let record = NewFileRecord {
        repo_id: repository.id,
        owner_id: repository.owner_id,
        content_hash: None,
        remote_path: path,
        display_name: filename.clone(),
        original_filename: filename,
        size: 0,
        mime: classification.mime,
        file_type: classification.file_type,
        width: None,
        height: None,
    };
    tx.add(&record).await.map_err(error::index)
}
