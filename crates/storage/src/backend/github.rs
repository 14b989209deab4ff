//! GitHub contents-API backend.

use crate::error::{ErrorKind, Result};
use crate::models::{Credential, DeleteOutcome, RemoteEntry, RemoteFile, RepoRef};
use crate::path::{validate as validate_path, validate_dir};
use crate::RemoteBackend;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use exn::{OptionExt, ResultExt};
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;

const MEDIA_TYPE: &str = "application/vnd.github+json";
const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
const API_VERSION: &str = "2022-11-28";

/// Identity recorded as the committer of uploads and deletes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
}

/// Backend talking to the GitHub REST contents API.
///
/// Every object is created with a single `PUT /repos/{owner}/{repo}/contents/{path}`
/// that carries no `sha`, which GitHub refuses when the path is already
/// occupied. That refusal is surfaced as
/// [`AlreadyExists`](ErrorKind::AlreadyExists), so uploads never overwrite.
pub struct GithubBackend {
    name: String,
    client: Client,
    api_base: Url,
    author: Option<CommitAuthor>,
}

impl GithubBackend {
    pub fn new(name: impl Into<String>, api_base: &str, timeout: Duration) -> Result<Self> {
        let api_base = Url::parse(api_base).or_raise(|| ErrorKind::BackendError(format!("invalid API base {api_base}")))?;
        if api_base.cannot_be_a_base() {
            exn::bail!(ErrorKind::BackendError(format!("invalid API base {api_base}")));
        }
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("gitshelf/", env!("CARGO_PKG_VERSION")))
            .build()
            .or_raise(|| ErrorKind::BackendError("could not build HTTP client".to_string()))?;
        Ok(Self {
            name: name.into(),
            client,
            api_base,
            author: None,
        })
    }

    pub fn with_author(mut self, author: Option<CommitAuthor>) -> Self {
        self.author = author;
        self
    }

    fn url<'s>(&self, segments: impl IntoIterator<Item = &'s str>) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .ok()
            .ok_or_raise(|| ErrorKind::BackendError(format!("invalid API base {}", self.api_base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn repo_url(&self, repo: &RepoRef) -> Result<Url> {
        self.url(["repos", repo.owner.as_str(), repo.name.as_str()])
    }

    fn branch_url(&self, repo: &RepoRef) -> Result<Url> {
        self.url(["repos", repo.owner.as_str(), repo.name.as_str(), "branches", repo.branch.as_str()])
    }

    fn contents_url(&self, repo: &RepoRef, path: &str) -> Result<Url> {
        let mut segments = vec!["repos", repo.owner.as_str(), repo.name.as_str(), "contents"];
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        self.url(segments)
    }

    fn authorized(&self, request: RequestBuilder, credential: &Credential) -> RequestBuilder {
        request
            .bearer_auth(credential.expose())
            .header(ACCEPT, MEDIA_TYPE)
            .header(API_VERSION_HEADER, API_VERSION)
    }

    async fn send(&self, request: RequestBuilder, credential: &Credential, operation: &str) -> Result<Response> {
        Ok(self.authorized(request, credential).send().await.map_err(|e| map_transport(&e, operation))?)
    }

    /// Blob sha of the object at `path`, or `None` when nothing is there.
    async fn object_sha(&self, credential: &Credential, repo: &RepoRef, path: &str) -> Result<Option<String>> {
        let mut url = self.contents_url(repo, path)?;
        url.query_pairs_mut().append_pair("ref", &repo.branch);
        let response = self.send(self.client.get(url), credential, "stat").await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let object: ObjectSha = response
                    .json()
                    .await
                    .or_raise(|| ErrorKind::BackendError(format!("unexpected response for {path}")))?;
                Ok(Some(object.sha))
            },
            status => exn::bail!(map_status(status, path)),
        }
    }

    async fn check_reachable(&self, url: Url, credential: &Credential, target: &str) -> Result<()> {
        let response = self.send(self.client.get(url), credential, "validate").await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                exn::bail!(ErrorKind::NotAccessible(target.to_string()))
            },
            status => exn::bail!(map_status(status, target)),
        }
    }
}

#[async_trait]
impl RemoteBackend for GithubBackend {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, credential), fields(backend = %self.name, repo = %repo.full_name()))]
    async fn validate(&self, credential: &Credential, repo: &RepoRef) -> Result<()> {
        self.check_reachable(self.repo_url(repo)?, credential, &repo.full_name()).await?;
        let branch = format!("{}@{}", repo.full_name(), repo.branch);
        self.check_reachable(self.branch_url(repo)?, credential, &branch).await
    }

    #[instrument(skip(self, credential, content), fields(backend = %self.name, repo = %repo.full_name(), size = content.len()))]
    async fn upload(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        path: &str,
        content: &[u8],
        message: &str,
    ) -> Result<()> {
        let path = validate_path(path)?;
        let body = PutContent {
            message,
            content: BASE64.encode(content),
            branch: &repo.branch,
            committer: self.author.as_ref(),
        };
        let request = self.client.put(self.contents_url(repo, &path)?).json(&body);
        let response = self.send(request, credential, "upload").await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            // GitHub answers 422 when a sha-less PUT targets an existing path.
            StatusCode::UNPROCESSABLE_ENTITY | StatusCode::CONFLICT => exn::bail!(ErrorKind::AlreadyExists(path)),
            status => exn::bail!(map_status(status, &path)),
        }
    }

    #[instrument(skip(self, credential), fields(backend = %self.name, repo = %repo.full_name()))]
    async fn delete(&self, credential: &Credential, repo: &RepoRef, path: &str, message: &str) -> Result<DeleteOutcome> {
        let path = validate_path(path)?;
        let Some(sha) = self.object_sha(credential, repo, &path).await? else {
            return Ok(DeleteOutcome::AlreadyAbsent);
        };
        let body = DeleteContent {
            message,
            sha: &sha,
            branch: &repo.branch,
            committer: self.author.as_ref(),
        };
        let request = self.client.delete(self.contents_url(repo, &path)?).json(&body);
        let response = self.send(request, credential, "delete").await?;
        match response.status() {
            status if status.is_success() => Ok(DeleteOutcome::Removed),
            StatusCode::NOT_FOUND => Ok(DeleteOutcome::AlreadyAbsent),
            status => exn::bail!(map_status(status, &path)),
        }
    }

    #[instrument(skip(self, credential), fields(backend = %self.name, repo = %repo.full_name()))]
    async fn list_dir(&self, credential: &Credential, repo: &RepoRef, dir: &str) -> Result<Vec<RemoteEntry>> {
        let dir = validate_dir(dir)?;
        let mut url = self.contents_url(repo, &dir)?;
        url.query_pairs_mut().append_pair("ref", &repo.branch);
        let response = self.send(self.client.get(url), credential, "list").await?;
        let status = response.status();
        if !status.is_success() {
            exn::bail!(map_status(status, &dir));
        }
        let items: Vec<ContentItem> = response
            .json()
            .await
            .or_raise(|| ErrorKind::BackendError(format!("{dir:?} is not a directory listing")))?;
        Ok(items.into_iter().filter_map(ContentItem::into_entry).collect())
    }
}

/// Map a non-success HTTP status onto an actionable error.
///
/// 409 and 422 only mean "already exists" for uploads, which map them
/// themselves; elsewhere they are validation or sha conflicts.
fn map_status(status: StatusCode, target: &str) -> ErrorKind {
    let target = target.to_string();
    match status {
        StatusCode::NOT_FOUND => ErrorKind::NotFound(target),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorKind::PermissionDenied(target),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ErrorKind::Timeout(target),
        status => ErrorKind::BackendError(format!("{target}: HTTP {status}")),
    }
}

fn map_transport(error: &reqwest::Error, operation: &str) -> ErrorKind {
    match error.is_timeout() {
        true => ErrorKind::Timeout(operation.to_string()),
        false => ErrorKind::Network(format!("{operation}: {error}")),
    }
}

#[derive(Serialize)]
struct PutContent<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    committer: Option<&'a CommitAuthor>,
}

#[derive(Serialize)]
struct DeleteContent<'a> {
    message: &'a str,
    sha: &'a str,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    committer: Option<&'a CommitAuthor>,
}

#[derive(Deserialize)]
struct ObjectSha {
    sha: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ContentItem {
    File {
        name: String,
        path: String,
        size: u64,
        sha: String,
        download_url: Option<String>,
    },
    Dir {
        name: String,
        path: String,
    },
    // Symlinks and submodules are not content.
    #[serde(other)]
    Other,
}

impl ContentItem {
    fn into_entry(self) -> Option<RemoteEntry> {
        match self {
            Self::File {
                name,
                path,
                size,
                sha,
                download_url,
            } => Some(RemoteEntry::File(RemoteFile {
                name,
                path,
                size,
                sha,
                download_url,
            })),
            Self::Dir { name, path } => Some(RemoteEntry::Dir { name, path }),
            Self::Other => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn backend(base: &str) -> GithubBackend {
        GithubBackend::new("github", base, Duration::from_secs(5)).unwrap()
    }

    fn repo() -> RepoRef {
        RepoRef::parse("https://github.com/octo/pictures", "main").unwrap()
    }

    #[rstest]
    #[case("https://api.github.com")]
    #[case("https://api.github.com/")]
    fn test_contents_url(#[case] base: &str) {
        let url = backend(base).contents_url(&repo(), "files/ab/ab cd.png").unwrap();
        assert_eq!(url.as_str(), "https://api.github.com/repos/octo/pictures/contents/files/ab/ab%20cd.png");
    }

    #[test]
    fn test_enterprise_base_keeps_prefix() {
        let url = backend("https://git.example.com/api/v3").branch_url(&repo()).unwrap();
        assert_eq!(url.as_str(), "https://git.example.com/api/v3/repos/octo/pictures/branches/main");
    }

    #[test]
    fn test_invalid_api_base() {
        let err = GithubBackend::new("github", "not a url", Duration::from_secs(1)).err().unwrap();
        assert!(matches!(&*err, ErrorKind::BackendError(_)));
    }

    #[rstest]
    #[case(StatusCode::NOT_FOUND, ErrorKind::NotFound("p".into()))]
    #[case(StatusCode::UNAUTHORIZED, ErrorKind::PermissionDenied("p".into()))]
    #[case(StatusCode::FORBIDDEN, ErrorKind::PermissionDenied("p".into()))]
    #[case(StatusCode::UNPROCESSABLE_ENTITY, ErrorKind::BackendError("p: HTTP 422 Unprocessable Entity".into()))]
    #[case(StatusCode::CONFLICT, ErrorKind::BackendError("p: HTTP 409 Conflict".into()))]
    #[case(StatusCode::GATEWAY_TIMEOUT, ErrorKind::Timeout("p".into()))]
    fn test_map_status(#[case] status: StatusCode, #[case] expected: ErrorKind) {
        assert_eq!(map_status(status, "p"), expected);
    }

    #[test]
    fn test_server_errors_are_retryable() {
        assert!(map_status(StatusCode::BAD_GATEWAY, "p").is_retryable());
        assert!(!map_status(StatusCode::NOT_FOUND, "p").is_retryable());
    }

    #[test]
    fn test_listing_deserialization_skips_other_types() {
        let body = serde_json::json!([
            {"type": "dir", "name": "ab", "path": "files/ab", "sha": "x", "size": 0},
            {"type": "file", "name": "a.txt", "path": "files/a.txt", "sha": "3b18e512dba79e4c8300dd08aeb37f8e728b8dad", "size": 12, "download_url": null},
            {"type": "symlink", "name": "link", "path": "files/link", "sha": "y", "size": 4},
        ]);
        let items: Vec<ContentItem> = serde_json::from_value(body).unwrap();
        let entries: Vec<_> = items.into_iter().filter_map(ContentItem::into_entry).collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path(), "files/ab");
        let RemoteEntry::File(file) = &entries[1] else { panic!("expected a file") };
        assert_eq!(file.size, 12);
        assert_eq!(file.download_url, None);
    }

    #[test]
    fn test_put_body_omits_missing_committer() {
        let body = PutContent {
            message: "Upload file: a.txt",
            content: BASE64.encode(b"hello world\n"),
            branch: "main",
            committer: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["content"], "aGVsbG8gd29ybGQK");
        assert!(json.get("committer").is_none());
    }
}
