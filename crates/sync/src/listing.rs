//! Paginated file listings with CDN URLs.

use crate::Context;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use gitshelf_index::{ConfigValue, FileRecord, Page, Paginated};
use std::collections::HashMap;
use tracing::instrument;

const NAMESPACE: &str = "file";
const CDN_HOST: &str = "cdn_host";

/// A file record as shown to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileView {
    pub record: FileRecord,
    /// `{cdnHost}/{repoDisplayName}/{remotePath}`.
    pub url: String,
}

fn cdn_url(host: &str, repository: &str, remote_path: &str) -> String {
    format!("{}/{}/{}", host.trim_end_matches('/'), repository.trim_matches('/'), remote_path.trim_start_matches('/'))
}

/// The owner's CDN host, falling back to the configured default.
pub async fn cdn_host(ctx: &Context, owner_id: i64) -> Result<String> {
    let configured = ctx.config.get(owner_id, NAMESPACE, CDN_HOST).await.or_raise(|| ErrorKind::Index)?;
    Ok(configured
        .as_ref()
        .and_then(ConfigValue::as_str)
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .unwrap_or(&ctx.settings.cdn.host)
        .to_string())
}

pub async fn set_cdn_host(ctx: &Context, owner_id: i64, host: &str) -> Result<()> {
    let host = host.trim();
    if !(host.starts_with("https://") || host.starts_with("http://")) {
        exn::bail!(ErrorKind::Validation(format!("CDN host {host:?} must be an http(s) URL")));
    }
    ctx.config.set(owner_id, NAMESPACE, CDN_HOST, &ConfigValue::from(host)).await.or_raise(|| ErrorKind::Index)
}

/// List the owner's files newest first, optionally within one repository.
///
/// Page number and size are clamped to the configured bounds.
#[instrument(skip(ctx))]
pub async fn list(
    ctx: &Context,
    owner_id: i64,
    repo_id: Option<i64>,
    page: Option<u32>,
    page_size: Option<u32>,
) -> Result<Paginated<FileView>> {
    let listing = &ctx.settings.listing;
    let page = Page::clamped(page, page_size, listing.default_page_size, listing.max_page_size);
    if let Some(repo_id) = repo_id {
        crate::repository::owned(ctx, repo_id, owner_id).await?;
    }
    let host = cdn_host(ctx, owner_id).await?;
    let names: HashMap<i64, String> = ctx
        .repositories
        .list(owner_id)
        .await
        .or_raise(|| ErrorKind::Index)?
        .into_iter()
        .map(|r| (r.id, r.display_name))
        .collect();
    let files = ctx.files.list(owner_id, repo_id, page).await.or_raise(|| ErrorKind::Index)?;
    Ok(files.map(|record| {
        let repository = names.get(&record.repo_id).map(String::as_str).unwrap_or_default();
        FileView { url: cdn_url(&host, repository, &record.remote_path), record }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, OWNER};
    use crate::upload::{UploadRequest, upload};
    use gitshelf_config::{CdnSettings, Settings};
    use gitshelf_storage::backend::MockBackend;
    use rstest::rstest;

    #[rstest]
    #[case("https://cdn.example.com", "octo/pictures", "files/ab/abc.png")]
    #[case("https://cdn.example.com/", "/octo/pictures/", "/files/ab/abc.png")]
    fn test_cdn_url(#[case] host: &str, #[case] repository: &str, #[case] path: &str) {
        assert_eq!(cdn_url(host, repository, path), "https://cdn.example.com/octo/pictures/files/ab/abc.png");
    }

    async fn harness() -> Harness {
        let settings = Settings {
            cdn: CdnSettings { host: "https://cdn.example.com".to_string() },
            ..Settings::default()
        };
        Harness::with_settings(MockBackend::default(), settings).await
    }

    async fn upload_many(h: &Harness, repo_id: i64, count: usize) {
        for i in 0..count {
            let request = UploadRequest {
                owner_id: OWNER,
                repo_id,
                filename: format!("{i}.txt"),
                content_type: None,
                force: false,
            };
            upload(&h.ctx, &request, format!("file number {i}\n").as_bytes()).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_pagination() {
        let h = harness().await;
        let repository = h.linked().await;
        upload_many(&h, repository.id, 25).await;

        let first = list(&h.ctx, OWNER, None, Some(1), Some(10)).await.unwrap();
        assert_eq!(first.items.len(), 10);
        assert_eq!(first.total, 25);
        assert!(first.has_more());
        assert_eq!(first.items[0].record.original_filename, "24.txt");

        let last = list(&h.ctx, OWNER, Some(repository.id), Some(3), Some(10)).await.unwrap();
        assert_eq!(last.items.len(), 5);
        assert!(!last.has_more());
        assert_eq!(last.total_pages(), 3);
    }

    #[tokio::test]
    async fn test_page_size_is_clamped() {
        let h = harness().await;
        let repository = h.linked().await;
        upload_many(&h, repository.id, 3).await;
        let page = list(&h.ctx, OWNER, None, Some(0), Some(10_000)).await.unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 100);
        let page = list(&h.ctx, OWNER, None, None, None).await.unwrap();
        assert_eq!(page.page_size, 10);
    }

    #[tokio::test]
    async fn test_urls_use_owner_cdn_host() {
        let h = harness().await;
        let repository = h.linked().await;
        upload_many(&h, repository.id, 1).await;

        let page = list(&h.ctx, OWNER, None, None, None).await.unwrap();
        let view = &page.items[0];
        assert_eq!(view.url, format!("https://cdn.example.com/octo/pictures/{}", view.record.remote_path));

        set_cdn_host(&h.ctx, OWNER, "https://img.octo.dev/").await.unwrap();
        let page = list(&h.ctx, OWNER, None, None, None).await.unwrap();
        assert!(page.items[0].url.starts_with("https://img.octo.dev/octo/pictures/files/"));
        assert!(set_cdn_host(&h.ctx, OWNER, "ftp://nope").await.is_err());
    }

    #[tokio::test]
    async fn test_listing_another_owners_repository() {
        let h = harness().await;
        let repository = h.linked().await;
        let err = list(&h.ctx, OWNER + 1, Some(repository.id), None, None).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Permission(_)));
    }
}
